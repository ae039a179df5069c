//! Read views over stored records
//!
//! A `TubRecord` wraps one `Record` and resolves its asset fields lazily
//! through a shared `AssetResolver`. Each asset field is resolved at most
//! once per `TubRecord`; later accesses return the cached outcome, whether
//! bytes or an error.

mod errors;
mod resolver;

pub use errors::{AssetError, AssetResult};
pub use resolver::{AssetResolver, FileAssetResolver};

use std::cell::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::catalog::Record;
use crate::manifest::Schema;

/// Read-only view over one record with lazy asset resolution
#[derive(Debug)]
pub struct TubRecord {
    record: Record,
    resolver: Arc<dyn AssetResolver>,
    /// One cell per asset-typed input, holding the first resolution outcome
    assets: HashMap<String, OnceCell<AssetResult<Vec<u8>>>>,
}

impl TubRecord {
    pub fn new(record: Record, schema: &Schema, resolver: Arc<dyn AssetResolver>) -> Self {
        let assets = schema
            .inputs()
            .iter()
            .zip(schema.types())
            .filter(|(_, field_type)| field_type.is_asset())
            .map(|(name, _)| (name.clone(), OnceCell::new()))
            .collect();

        Self {
            record,
            resolver,
            assets,
        }
    }

    pub fn index(&self) -> u64 {
        self.record.index()
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.record.timestamp_ms()
    }

    /// Raw stored value of a field; asset fields yield their reference
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.record.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        self.record.fields()
    }

    /// The stored record as one JSON object, system fields included
    pub fn underlying(&self) -> Value {
        self.record.to_value()
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Whether `field` has already been resolved successfully
    pub fn is_resolved(&self, field: &str) -> bool {
        self.assets
            .get(field)
            .map_or(false, |cell| matches!(cell.get(), Some(Ok(_))))
    }

    /// Bytes of an asset field, resolved on first access.
    ///
    /// # Errors
    ///
    /// - `NotAnAsset` if the field is not declared with an asset type
    /// - `MissingReference` if the record holds no string reference for it
    /// - Whatever the resolver reports
    ///
    /// The first outcome is cached, so a failed field reports the same error
    /// again without calling the resolver.
    pub fn asset(&self, field: &str) -> AssetResult<&[u8]> {
        let cell = self
            .assets
            .get(field)
            .ok_or_else(|| AssetError::NotAnAsset(field.to_string()))?;

        cell.get_or_init(|| self.resolve(field))
            .as_deref()
            .map_err(|e| e.clone())
    }

    fn resolve(&self, field: &str) -> AssetResult<Vec<u8>> {
        if !matches!(self.record.get(field), Some(Value::String(_))) {
            return Err(AssetError::MissingReference(field.to_string()));
        }
        self.resolver.resolve(field, self.record.fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingResolver {
        calls: AtomicUsize,
    }

    impl AssetResolver for CountingResolver {
        fn resolve(&self, field: &str, fields: &Map<String, Value>) -> AssetResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match fields.get(field) {
                Some(Value::String(reference)) if reference == "broken" => Err(AssetError::Resolve {
                    field: field.to_string(),
                    reason: "unreadable".to_string(),
                }),
                Some(Value::String(reference)) => Ok(reference.as_bytes().to_vec()),
                _ => Err(AssetError::MissingReference(field.to_string())),
            }
        }
    }

    fn schema() -> Schema {
        Schema::parse(&["cam/image_array", "user/angle"], &["image_array", "float"]).unwrap()
    }

    fn tub_record(fields: Value, resolver: Arc<CountingResolver>) -> TubRecord {
        let record = Record::new(4, 1_000, fields.as_object().unwrap().clone());
        TubRecord::new(record, &schema(), resolver)
    }

    #[test]
    fn test_asset_resolved_once() {
        let resolver = Arc::new(CountingResolver::default());
        let record = tub_record(
            json!({"cam/image_array": "4_cam.jpg", "user/angle": 0.1}),
            resolver.clone(),
        );

        assert!(!record.is_resolved("cam/image_array"));
        assert_eq!(record.asset("cam/image_array").unwrap(), b"4_cam.jpg");
        assert_eq!(record.asset("cam/image_array").unwrap(), b"4_cam.jpg");
        assert!(record.is_resolved("cam/image_array"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_non_asset_field_rejected() {
        let resolver = Arc::new(CountingResolver::default());
        let record = tub_record(json!({"user/angle": 0.1}), resolver.clone());

        assert_eq!(
            record.asset("user/angle").unwrap_err(),
            AssetError::NotAnAsset("user/angle".to_string())
        );
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_reference() {
        let resolver = Arc::new(CountingResolver::default());
        let record = tub_record(json!({"cam/image_array": null}), resolver.clone());

        assert_eq!(
            record.asset("cam/image_array").unwrap_err(),
            AssetError::MissingReference("cam/image_array".to_string())
        );
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_resolution_cached() {
        let resolver = Arc::new(CountingResolver::default());
        let record = tub_record(json!({"cam/image_array": "broken"}), resolver.clone());

        let first = record.asset("cam/image_array").unwrap_err();
        let second = record.asset("cam/image_array").unwrap_err();
        assert_eq!(first, second);
        assert!(matches!(first, AssetError::Resolve { .. }));
        assert!(!record.is_resolved("cam/image_array"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_underlying_includes_system_fields() {
        let resolver = Arc::new(CountingResolver::default());
        let record = tub_record(json!({"user/angle": 0.25}), resolver);

        let value = record.underlying();
        assert_eq!(value["_index"], 4);
        assert_eq!(value["_timestamp_ms"], 1_000);
        assert_eq!(value["user/angle"], 0.25);
        assert_eq!(record.index(), 4);
    }
}
