//! Durable tub manifest
//!
//! `<base_path>/manifest.json` is the authoritative description of a tub:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "tub_id": "6f1c5e1e-...",
//!   "created_at": "2026-10-19T09:30:00Z",
//!   "inputs": ["input"],
//!   "types": ["int"],
//!   "metadata": [["meta1", "metavalue1"]],
//!   "deleted_indexes": [3, 8],
//!   "current_index": 13,
//!   "max_catalog_len": 1000,
//!   "segments": ["catalog_0.catalog"]
//! }
//! ```
//!
//! Every mutation is persisted before the call returns: the JSON is written
//! to `manifest.json.tmp`, fsynced, renamed over `manifest.json`, and the
//! directory is fsynced.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::metadata::Metadata;
use super::schema::{FieldType, Schema};
use crate::errors::{TubError, TubResult};

/// Manifest file name under the tub root
pub const MANIFEST_FILE: &str = "manifest.json";

const MANIFEST_TMP_FILE: &str = "manifest.json.tmp";

const FORMAT_VERSION: u8 = 1;

/// On-disk manifest layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct ManifestDocument {
    format_version: u8,
    tub_id: Uuid,
    created_at: DateTime<Utc>,
    inputs: Vec<String>,
    types: Vec<FieldType>,
    metadata: Metadata,
    deleted_indexes: BTreeSet<u64>,
    /// Last assigned index, -1 while empty
    current_index: i64,
    max_catalog_len: u64,
    segments: Vec<String>,
}

/// Schema, metadata, deletion set and index counter of one tub.
pub struct Manifest {
    base_path: PathBuf,
    schema: Schema,
    doc: ManifestDocument,
}

impl Manifest {
    /// Whether a manifest exists under `base_path`
    pub fn exists(base_path: &Path) -> bool {
        base_path.join(MANIFEST_FILE).is_file()
    }

    /// Creates a new, empty manifest and writes it durably.
    ///
    /// Creates `base_path` if needed.
    ///
    /// # Errors
    ///
    /// - `TUB_ALREADY_EXISTS` if a manifest is already present
    /// - `TUB_INVALID_SCHEMA` if `max_catalog_len` is zero
    /// - `TUB_MANIFEST_IO` if the directory or file cannot be written
    pub fn create(
        base_path: &Path,
        schema: Schema,
        metadata: Metadata,
        max_catalog_len: u64,
    ) -> TubResult<Self> {
        if Self::exists(base_path) {
            return Err(TubError::already_exists(format!(
                "Manifest already exists: {}",
                base_path.join(MANIFEST_FILE).display()
            )));
        }
        if max_catalog_len == 0 {
            return Err(TubError::invalid_schema("max_catalog_len must be > 0"));
        }

        fs::create_dir_all(base_path).map_err(|e| {
            TubError::manifest_io(
                format!("Failed to create tub directory: {}", base_path.display()),
                e,
            )
        })?;

        let doc = ManifestDocument {
            format_version: FORMAT_VERSION,
            tub_id: Uuid::new_v4(),
            created_at: Utc::now(),
            inputs: schema.inputs().to_vec(),
            types: schema.types().to_vec(),
            metadata,
            deleted_indexes: BTreeSet::new(),
            current_index: -1,
            max_catalog_len,
            segments: Vec::new(),
        };

        let manifest = Self {
            base_path: base_path.to_path_buf(),
            schema,
            doc,
        };
        manifest.persist()?;
        Ok(manifest)
    }

    /// Loads an existing manifest and checks it against the caller's schema.
    ///
    /// # Errors
    ///
    /// `TUB_SCHEMA_MISMATCH` if the stored inputs or types differ in content
    /// or order. Nothing is written in that case.
    pub fn open(base_path: &Path, schema: &Schema) -> TubResult<Self> {
        let manifest = Self::load(base_path)?;

        if manifest.schema.inputs() != schema.inputs() {
            return Err(TubError::schema_mismatch("Stored inputs differ from requested inputs")
                .with_details(format!(
                    "stored: {:?}, requested: {:?}",
                    manifest.schema.inputs(),
                    schema.inputs()
                )));
        }
        if manifest.schema.types() != schema.types() {
            return Err(TubError::schema_mismatch("Stored types differ from requested types")
                .with_details(format!(
                    "stored: {:?}, requested: {:?}",
                    manifest.schema.types(),
                    schema.types()
                )));
        }

        Ok(manifest)
    }

    /// Loads an existing manifest, adopting whatever schema it stores.
    ///
    /// # Errors
    ///
    /// - `TUB_NOT_FOUND` if there is no manifest
    /// - `TUB_MANIFEST_IO` if it cannot be read
    /// - `TUB_CORRUPTION` if it does not parse or breaks its invariants
    pub fn load(base_path: &Path) -> TubResult<Self> {
        let path = base_path.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TubError::not_found(format!("No manifest at {}", path.display()))
            } else {
                TubError::manifest_io(format!("Failed to read manifest: {}", path.display()), e)
            }
        })?;

        let doc: ManifestDocument = serde_json::from_str(&content).map_err(|e| {
            TubError::corruption(format!("Failed to parse manifest: {}", e))
                .with_details(format!("path: {}", path.display()))
        })?;

        Self::check_document(&doc)?;

        let schema = Schema::new(doc.inputs.clone(), doc.types.clone())
            .map_err(|e| TubError::corruption(format!("Stored schema is invalid: {}", e.message())))?;

        Ok(Self {
            base_path: base_path.to_path_buf(),
            schema,
            doc,
        })
    }

    fn check_document(doc: &ManifestDocument) -> TubResult<()> {
        if doc.format_version != FORMAT_VERSION {
            return Err(TubError::corruption(format!(
                "Unsupported manifest format_version {}",
                doc.format_version
            )));
        }
        if doc.current_index < -1 {
            return Err(TubError::corruption(format!(
                "Invalid current_index {}",
                doc.current_index
            )));
        }
        if doc.max_catalog_len == 0 {
            return Err(TubError::corruption("max_catalog_len is zero"));
        }
        if let Some(&max_deleted) = doc.deleted_indexes.iter().next_back() {
            if max_deleted as i64 > doc.current_index {
                return Err(TubError::corruption(format!(
                    "Deleted index {} beyond current_index {}",
                    max_deleted, doc.current_index
                )));
            }
        }
        Ok(())
    }

    /// Tub root directory
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of the manifest file
    pub fn path(&self) -> PathBuf {
        self.base_path.join(MANIFEST_FILE)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn metadata(&self) -> &Metadata {
        &self.doc.metadata
    }

    pub fn tub_id(&self) -> Uuid {
        self.doc.tub_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.doc.created_at
    }

    /// Last assigned index, -1 while nothing has been written
    pub fn current_index(&self) -> i64 {
        self.doc.current_index
    }

    /// Number of indices ever assigned
    pub fn assigned_count(&self) -> u64 {
        (self.doc.current_index + 1) as u64
    }

    pub fn max_catalog_len(&self) -> u64 {
        self.doc.max_catalog_len
    }

    /// Segment file names in creation order
    pub fn segments(&self) -> &[String] {
        &self.doc.segments
    }

    pub fn deleted_indexes(&self) -> &BTreeSet<u64> {
        &self.doc.deleted_indexes
    }

    pub fn is_deleted(&self, index: u64) -> bool {
        self.doc.deleted_indexes.contains(&index)
    }

    /// Assigns the next index and persists the counter before returning.
    ///
    /// The catalog append for this index happens strictly afterwards, so an
    /// index is never handed out twice even if that append fails.
    pub fn reserve_next_index(&mut self) -> TubResult<u64> {
        self.doc.current_index += 1;
        if let Err(e) = self.persist() {
            self.doc.current_index -= 1;
            return Err(e);
        }
        Ok(self.doc.current_index as u64)
    }

    /// Adds indices to the deletion set.
    ///
    /// Already deleted indices and indices never assigned are skipped.
    /// Persists only when the set changed.
    ///
    /// # Returns
    ///
    /// The number of newly deleted indices.
    pub fn mark_deleted<I: IntoIterator<Item = u64>>(&mut self, indices: I) -> TubResult<usize> {
        let assigned = self.assigned_count();
        let added: Vec<u64> = indices
            .into_iter()
            .filter(|&index| index < assigned)
            .filter(|&index| self.doc.deleted_indexes.insert(index))
            .collect();

        if added.is_empty() {
            return Ok(0);
        }

        if let Err(e) = self.persist() {
            for index in &added {
                self.doc.deleted_indexes.remove(index);
            }
            return Err(e);
        }
        Ok(added.len())
    }

    /// Registers a newly created segment file
    pub fn record_segment(&mut self, name: impl Into<String>) -> TubResult<()> {
        self.doc.segments.push(name.into());
        if let Err(e) = self.persist() {
            self.doc.segments.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Serializes the manifest to pretty-printed JSON
    pub fn to_json(&self) -> TubResult<String> {
        serde_json::to_string_pretty(&self.doc).map_err(|e| {
            TubError::corruption(format!("Failed to serialize manifest: {}", e))
        })
    }

    /// Writes the manifest atomically: temp file, fsync, rename, directory fsync.
    fn persist(&self) -> TubResult<()> {
        let json = self.to_json()?;
        let tmp_path = self.base_path.join(MANIFEST_TMP_FILE);
        let final_path = self.path();

        let mut file = File::create(&tmp_path).map_err(|e| {
            TubError::manifest_io(
                format!("Failed to create manifest file: {}", tmp_path.display()),
                e,
            )
        })?;

        file.write_all(json.as_bytes()).map_err(|e| {
            TubError::manifest_io(format!("Failed to write manifest: {}", tmp_path.display()), e)
        })?;

        file.sync_all().map_err(|e| {
            TubError::manifest_io(format!("Failed to fsync manifest: {}", tmp_path.display()), e)
        })?;
        drop(file);

        fs::rename(&tmp_path, &final_path).map_err(|e| {
            TubError::manifest_io(
                format!("Failed to install manifest: {}", final_path.display()),
                e,
            )
        })?;

        let dir_handle = OpenOptions::new()
            .read(true)
            .open(&self.base_path)
            .map_err(|e| {
                TubError::manifest_io(
                    format!("Failed to open tub directory for fsync: {}", self.base_path.display()),
                    e,
                )
            })?;
        dir_handle.sync_all().map_err(|e| {
            TubError::manifest_io(
                format!("Failed to fsync tub directory: {}", self.base_path.display()),
                e,
            )
        })?;

        Ok(())
    }
}
