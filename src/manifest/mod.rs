//! Manifest subsystem
//!
//! The manifest holds everything about a tub that is not a record: the
//! schema, creation metadata, the set of soft-deleted indices and the index
//! counter. It is rewritten atomically on every change.
//!
//! # Invariants
//!
//! - `current_index` only grows; an index is never handed out twice
//! - `deleted_indexes` only grows and stays within `[0, current_index]`
//! - `inputs`, `types` and `metadata` never change after creation

#[allow(clippy::module_inception)]
mod manifest;
mod metadata;
mod schema;

pub use manifest::{Manifest, MANIFEST_FILE};
pub use metadata::Metadata;
pub use schema::{FieldType, Schema, SYSTEM_FIELD_PREFIX};
