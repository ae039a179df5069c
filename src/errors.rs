//! Tub error types
//!
//! Error codes:
//! - TUB_SCHEMA_MISMATCH (FATAL severity)
//! - TUB_WRITE_FAILURE (ERROR severity)
//! - TUB_NOT_FOUND (ERROR severity)
//! - TUB_CORRUPTION (FATAL severity)
//! - TUB_MANIFEST_IO (FATAL severity)
//! - TUB_CATALOG_IO (ERROR severity)
//! - TUB_INVALID_SCHEMA (ERROR severity)
//! - TUB_INVALID_RECORD (ERROR severity)
//! - TUB_ALREADY_EXISTS (ERROR severity)

use std::fmt;
use std::io;

/// Severity levels for tub errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, the tub stays usable
    Error,
    /// The tub cannot be used until the cause is fixed
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Tub error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TubErrorCode {
    /// Stored inputs/types differ from the caller's
    SchemaMismatch,
    /// I/O failure while appending a record
    WriteFailure,
    /// Index or manifest does not exist
    NotFound,
    /// Catalog or manifest bytes are damaged
    Corruption,
    /// Manifest could not be read or written
    ManifestIo,
    /// Segment file could not be opened, read or repaired
    CatalogIo,
    /// Inputs/types are not a valid schema
    InvalidSchema,
    /// Record fields do not match the schema
    InvalidRecord,
    /// A manifest already exists at the path
    AlreadyExists,
}

impl TubErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            TubErrorCode::SchemaMismatch => "TUB_SCHEMA_MISMATCH",
            TubErrorCode::WriteFailure => "TUB_WRITE_FAILURE",
            TubErrorCode::NotFound => "TUB_NOT_FOUND",
            TubErrorCode::Corruption => "TUB_CORRUPTION",
            TubErrorCode::ManifestIo => "TUB_MANIFEST_IO",
            TubErrorCode::CatalogIo => "TUB_CATALOG_IO",
            TubErrorCode::InvalidSchema => "TUB_INVALID_SCHEMA",
            TubErrorCode::InvalidRecord => "TUB_INVALID_RECORD",
            TubErrorCode::AlreadyExists => "TUB_ALREADY_EXISTS",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            TubErrorCode::SchemaMismatch
            | TubErrorCode::Corruption
            | TubErrorCode::ManifestIo => Severity::Fatal,
            TubErrorCode::WriteFailure
            | TubErrorCode::CatalogIo
            | TubErrorCode::NotFound
            | TubErrorCode::InvalidSchema
            | TubErrorCode::InvalidRecord
            | TubErrorCode::AlreadyExists => Severity::Error,
        }
    }
}

impl fmt::Display for TubErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Tub error type with code, message and optional context
#[derive(Debug)]
pub struct TubError {
    code: TubErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl TubError {
    fn new(code: TubErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Stored schema differs from the caller's
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::new(TubErrorCode::SchemaMismatch, message)
    }

    /// Append failed; the reserved index is burned
    pub fn write_failure(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(TubErrorCode::WriteFailure, message)
        }
    }

    /// Read of an index with no visible record
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TubErrorCode::NotFound, message)
    }

    /// Not-found error carrying the offending index
    pub fn index_not_found(index: u64, length: u64) -> Self {
        Self::not_found(format!("No record at index {}", index))
            .with_details(format!("catalog_length: {}", length))
    }

    /// Damaged catalog or manifest content
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::new(TubErrorCode::Corruption, message)
    }

    /// Corruption at a byte offset of a segment file
    pub fn corruption_at_offset(segment: &str, offset: u64, reason: impl Into<String>) -> Self {
        Self::corruption(reason)
            .with_details(format!("segment: {}, byte_offset: {}", segment, offset))
    }

    /// Manifest read/write failure
    pub fn manifest_io(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(TubErrorCode::ManifestIo, message)
        }
    }

    /// Segment file I/O failure outside of an append.
    ///
    /// Not fatal: the bytes on disk are not known to be damaged.
    pub fn catalog_io(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(TubErrorCode::CatalogIo, message)
        }
    }

    /// Inputs/types cannot form a schema
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::new(TubErrorCode::InvalidSchema, message)
    }

    /// Record rejected by schema validation
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::new(TubErrorCode::InvalidRecord, message)
    }

    /// Refusing to overwrite an existing manifest
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(TubErrorCode::AlreadyExists, message)
    }

    /// Add details to an error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Returns the error code
    pub fn code(&self) -> TubErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether the tub must not be used further
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for TubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for TubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for tub operations
pub type TubResult<T> = Result<T, TubError>;
