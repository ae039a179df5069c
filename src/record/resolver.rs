//! Asset resolvers
//!
//! A resolver turns the reference stored in an asset field into the asset's
//! bytes. Records share one resolver through an `Arc`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};

use super::errors::{AssetError, AssetResult};
use crate::config::TubConfig;

/// Resolution context injected into every `TubRecord`
pub trait AssetResolver: Send + Sync + std::fmt::Debug {
    /// Loads the asset referenced by `field` within `fields`
    fn resolve(&self, field: &str, fields: &Map<String, Value>) -> AssetResult<Vec<u8>>;
}

/// Reads assets from a directory under the tub root
#[derive(Debug, Clone)]
pub struct FileAssetResolver {
    root: PathBuf,
}

impl FileAssetResolver {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolver rooted at `<base_path>/<asset_dir>`
    pub fn for_tub(base_path: &Path, config: &TubConfig) -> Self {
        Self::new(base_path.join(&config.asset_dir))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, reference: &str) -> AssetResult<PathBuf> {
        let relative = Path::new(reference);
        let confined = !reference.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !confined {
            return Err(AssetError::InvalidReference(reference.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl AssetResolver for FileAssetResolver {
    fn resolve(&self, field: &str, fields: &Map<String, Value>) -> AssetResult<Vec<u8>> {
        let reference = match fields.get(field) {
            Some(Value::String(reference)) => reference,
            _ => return Err(AssetError::MissingReference(field.to_string())),
        };

        let full_path = self.full_path(reference)?;
        fs::read(&full_path).map_err(|e| AssetError::Resolve {
            field: field.to_string(),
            reason: format!("{}: {}", full_path.display(), e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn fields(reference: &str) -> Map<String, Value> {
        json!({ "cam/image_array": reference }).as_object().unwrap().clone()
    }

    #[test]
    fn test_reads_relative_reference() {
        let temp = TempDir::new().unwrap();
        let resolver = FileAssetResolver::for_tub(temp.path(), &TubConfig::default());
        fs::create_dir_all(resolver.root()).unwrap();
        fs::write(resolver.root().join("0_cam.jpg"), b"jpeg").unwrap();

        let bytes = resolver.resolve("cam/image_array", &fields("0_cam.jpg")).unwrap();
        assert_eq!(bytes, b"jpeg");
    }

    #[test]
    fn test_rejects_escaping_reference() {
        let temp = TempDir::new().unwrap();
        let resolver = FileAssetResolver::new(temp.path().to_path_buf());

        for reference in ["../secret", "/etc/passwd", ""] {
            let err = resolver.resolve("cam/image_array", &fields(reference)).unwrap_err();
            assert_eq!(err, AssetError::InvalidReference(reference.to_string()));
        }
    }

    #[test]
    fn test_missing_file_is_resolve_error() {
        let temp = TempDir::new().unwrap();
        let resolver = FileAssetResolver::new(temp.path().to_path_buf());
        let err = resolver.resolve("cam/image_array", &fields("gone.jpg")).unwrap_err();
        assert!(matches!(err, AssetError::Resolve { .. }));
    }

    #[test]
    fn test_non_string_reference() {
        let temp = TempDir::new().unwrap();
        let resolver = FileAssetResolver::new(temp.path().to_path_buf());
        let fields = json!({ "cam/image_array": 3 }).as_object().unwrap().clone();
        assert_eq!(
            resolver.resolve("cam/image_array", &fields).unwrap_err(),
            AssetError::MissingReference("cam/image_array".to_string())
        );
    }
}
