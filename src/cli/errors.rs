//! CLI-specific error types
//!
//! Tub errors keep their own code so the printed line matches the library's.

use std::fmt;
use std::io;

use crate::collator::CollatorError;
use crate::config::ConfigError;
use crate::errors::{TubError, TubErrorCode};

/// CLI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout)
    IoError,
    /// Argument rejected after parsing
    InvalidArgument,
    /// Error reported by the tub itself
    Tub(TubErrorCode),
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "TUB_CLI_CONFIG_ERROR",
            Self::IoError => "TUB_CLI_IO_ERROR",
            Self::InvalidArgument => "TUB_CLI_INVALID_ARGUMENT",
            Self::Tub(code) => code.code(),
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidArgument, msg)
    }

    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<TubError> for CliError {
    fn from(e: TubError) -> Self {
        let message = match e.details() {
            Some(details) => format!("{} ({})", e.message(), details),
            None => e.message().to_string(),
        };
        Self::new(CliErrorCode::Tub(e.code()), message)
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<CollatorError> for CliError {
    fn from(e: CollatorError) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tub_error_keeps_code() {
        let err = CliError::from(TubError::index_not_found(9, 3));
        assert_eq!(err.code_str(), "TUB_NOT_FOUND");
        assert!(err.to_string().starts_with("TUB_NOT_FOUND: "));
    }

    #[test]
    fn test_collator_error_is_invalid_argument() {
        let err = CliError::from(CollatorError::InvalidWindowLength(0));
        assert_eq!(err.code(), CliErrorCode::InvalidArgument);
    }
}
