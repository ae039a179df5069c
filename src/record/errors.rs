//! Asset resolution errors

use thiserror::Error;

/// Result type for asset resolution
pub type AssetResult<T> = Result<T, AssetError>;

/// Asset resolution errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    #[error("Field '{0}' is not declared as an asset type")]
    NotAnAsset(String),

    #[error("Field '{0}' has no asset reference")]
    MissingReference(String),

    #[error("Invalid asset reference '{0}': must be a relative path without '..'")]
    InvalidReference(String),

    #[error("Failed to resolve asset field '{field}': {reason}")]
    Resolve { field: String, reason: String },
}
