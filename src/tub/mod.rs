//! Tub: an append-only record store
//!
//! A tub is a directory holding one manifest (schema, metadata, deletion set,
//! index counter) and the catalog segments with the records themselves.
//!
//! ```text
//! <base_path>/
//!   manifest.json
//!   catalog_0.catalog
//!   catalog_1.catalog
//!   images/            (assets, read by FileAssetResolver)
//! ```
//!
//! # Invariants
//!
//! - Indices are assigned once, ascending, and never reused
//! - Deletion is logical: catalog bytes are never rewritten
//! - `len()` counts indices that have an entry and are not deleted
//!
//! Mutations take `&mut self` and iteration borrows `&self`, so a traversal
//! always sees the state the tub had when it started.

mod iter;
mod selection;

pub use iter::{TubIter, TubRecords};
pub use selection::IndexSelection;

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::catalog::{Catalog, Record};
use crate::config::TubConfig;
use crate::errors::{TubError, TubResult};
use crate::manifest::{Manifest, Metadata, Schema};
use crate::observability::{log_event_with_fields, Event};
use crate::record::{AssetResolver, FileAssetResolver};

/// Append-only record store rooted at one directory
pub struct Tub {
    manifest: Manifest,
    catalog: Catalog,
    config: TubConfig,
}

impl Tub {
    /// Creates a new tub with the default configuration.
    ///
    /// # Errors
    ///
    /// - `TUB_ALREADY_EXISTS` if `base_path` already holds a manifest
    /// - `TUB_INVALID_SCHEMA` if `inputs` and `types` do not form a schema
    pub fn create<S: AsRef<str>, T: AsRef<str>>(
        base_path: impl AsRef<Path>,
        inputs: &[S],
        types: &[T],
        metadata: Metadata,
    ) -> TubResult<Self> {
        Self::create_with_config(base_path, inputs, types, metadata, TubConfig::default())
    }

    pub fn create_with_config<S: AsRef<str>, T: AsRef<str>>(
        base_path: impl AsRef<Path>,
        inputs: &[S],
        types: &[T],
        metadata: Metadata,
        config: TubConfig,
    ) -> TubResult<Self> {
        let base_path = base_path.as_ref();
        let schema = Schema::parse(inputs, types)?;
        let manifest = Manifest::create(base_path, schema, metadata, config.max_catalog_len)?;
        let catalog = Catalog::create(&manifest);

        log_event_with_fields(
            Event::TubCreated,
            &[
                ("path", base_path.display().to_string().as_str()),
                ("tub_id", manifest.tub_id().to_string().as_str()),
            ],
        );

        Ok(Self {
            manifest,
            catalog,
            config,
        })
    }

    /// Opens an existing tub, checking its stored schema.
    ///
    /// # Errors
    ///
    /// - `TUB_NOT_FOUND` if there is no manifest
    /// - `TUB_SCHEMA_MISMATCH` if the stored inputs or types differ
    /// - `TUB_CORRUPTION` if the catalog cannot be rebuilt
    pub fn open<S: AsRef<str>, T: AsRef<str>>(
        base_path: impl AsRef<Path>,
        inputs: &[S],
        types: &[T],
    ) -> TubResult<Self> {
        Self::open_with_config(base_path, inputs, types, TubConfig::default())
    }

    pub fn open_with_config<S: AsRef<str>, T: AsRef<str>>(
        base_path: impl AsRef<Path>,
        inputs: &[S],
        types: &[T],
        config: TubConfig,
    ) -> TubResult<Self> {
        let schema = Schema::parse(inputs, types)?;
        let manifest = Manifest::open(base_path.as_ref(), &schema)?;
        Self::attach(manifest, config)
    }

    /// Opens the tub at `base_path` if one exists, otherwise creates it.
    ///
    /// `metadata` is only used when creating.
    pub fn open_or_create<S: AsRef<str>, T: AsRef<str>>(
        base_path: impl AsRef<Path>,
        inputs: &[S],
        types: &[T],
        metadata: Metadata,
    ) -> TubResult<Self> {
        Self::open_or_create_with_config(base_path, inputs, types, metadata, TubConfig::default())
    }

    pub fn open_or_create_with_config<S: AsRef<str>, T: AsRef<str>>(
        base_path: impl AsRef<Path>,
        inputs: &[S],
        types: &[T],
        metadata: Metadata,
        config: TubConfig,
    ) -> TubResult<Self> {
        if Manifest::exists(base_path.as_ref()) {
            Self::open_with_config(base_path, inputs, types, config)
        } else {
            Self::create_with_config(base_path, inputs, types, metadata, config)
        }
    }

    /// Opens an existing tub with whatever schema it stores
    pub fn load(base_path: impl AsRef<Path>) -> TubResult<Self> {
        Self::load_with_config(base_path, TubConfig::default())
    }

    pub fn load_with_config(base_path: impl AsRef<Path>, config: TubConfig) -> TubResult<Self> {
        let manifest = Manifest::load(base_path.as_ref())?;
        Self::attach(manifest, config)
    }

    fn attach(mut manifest: Manifest, config: TubConfig) -> TubResult<Self> {
        let catalog = Catalog::open(&mut manifest)?;

        let tub = Self {
            manifest,
            catalog,
            config,
        };
        log_event_with_fields(
            Event::TubOpened,
            &[
                ("path", tub.base_path().display().to_string().as_str()),
                ("length", tub.len().to_string().as_str()),
                ("deleted", tub.deleted_indexes().len().to_string().as_str()),
            ],
        );
        Ok(tub)
    }

    /// Validates and durably appends one record.
    ///
    /// # Returns
    ///
    /// The index assigned to the record.
    ///
    /// # Errors
    ///
    /// - `TUB_INVALID_RECORD` if `record` is not an object or breaks the schema
    /// - `TUB_WRITE_FAILURE` if the append cannot be made durable
    pub fn write_record(&mut self, record: &Value) -> TubResult<u64> {
        let fields = record
            .as_object()
            .ok_or_else(|| TubError::invalid_record("Record must be a JSON object"))?;
        self.manifest.schema().validate_fields(fields)?;
        self.catalog.append(&mut self.manifest, fields)
    }

    /// Soft-deletes one or many indices.
    ///
    /// Already-deleted and never-assigned indices are ignored.
    ///
    /// # Returns
    ///
    /// How many indices were newly deleted.
    pub fn delete_records(&mut self, selection: impl Into<IndexSelection>) -> TubResult<usize> {
        let count = self.manifest.mark_deleted(selection.into())?;
        if count > 0 {
            log_event_with_fields(Event::RecordsDeleted, &[("count", count.to_string().as_str())]);
        }
        Ok(count)
    }

    /// Soft-deletes the `n` highest live records.
    ///
    /// # Returns
    ///
    /// How many indices were deleted; fewer than `n` if the tub runs out.
    pub fn delete_last_n_records(&mut self, n: usize) -> TubResult<usize> {
        let targets: Vec<u64> = (0..self.catalog.length())
            .rev()
            .filter(|&index| self.is_live(index))
            .take(n)
            .collect();
        self.delete_records(targets)
    }

    /// Number of non-deleted records
    pub fn len(&self) -> u64 {
        let deleted_entries = self
            .manifest
            .deleted_indexes()
            .iter()
            .filter(|&&index| self.catalog.contains(index))
            .count();
        self.catalog.entry_count() - deleted_entries as u64
    }

    /// Whether `index` holds a record that is not deleted
    pub(crate) fn is_live(&self, index: u64) -> bool {
        self.catalog.contains(index) && !self.manifest.is_deleted(index)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-deleted records in ascending index order.
    ///
    /// Each call starts a fresh traversal.
    pub fn iter(&self) -> TubIter<'_> {
        TubIter::new(self)
    }

    /// Like `iter`, wrapping each record for lazy asset access
    pub fn records(&self, resolver: Arc<dyn AssetResolver>) -> TubRecords<'_> {
        TubRecords::new(self, resolver)
    }

    /// Resolver reading assets from this tub's asset directory
    pub fn asset_resolver(&self) -> Arc<dyn AssetResolver> {
        Arc::new(FileAssetResolver::for_tub(self.base_path(), &self.config))
    }

    /// Reads one non-deleted record.
    ///
    /// # Errors
    ///
    /// `TUB_NOT_FOUND` if the index was never assigned or is deleted.
    pub fn get(&self, index: u64) -> TubResult<Record> {
        if self.is_deleted(index) {
            return Err(TubError::not_found(format!("Index {} is deleted", index)));
        }
        self.catalog.read(index)
    }

    pub fn is_deleted(&self, index: u64) -> bool {
        self.manifest.is_deleted(index)
    }

    pub fn deleted_indexes(&self) -> &BTreeSet<u64> {
        self.manifest.deleted_indexes()
    }

    pub fn base_path(&self) -> &Path {
        self.manifest.base_path()
    }

    pub fn metadata(&self) -> &Metadata {
        self.manifest.metadata()
    }

    pub fn schema(&self) -> &Schema {
        self.manifest.schema()
    }

    pub fn tub_id(&self) -> Uuid {
        self.manifest.tub_id()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn config(&self) -> &TubConfig {
        &self.config
    }
}

impl fmt::Debug for Tub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tub")
            .field("base_path", &self.base_path())
            .field("tub_id", &self.tub_id())
            .field("len", &self.len())
            .field("deleted", &self.deleted_indexes().len())
            .finish()
    }
}

impl<'a> IntoIterator for &'a Tub {
    type Item = TubResult<Record>;
    type IntoIter = TubIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
