//! tubstore - an append-only record store with contiguous windowing
//!
//! A tub persists a sequence of schema-checked records together with a
//! durable manifest. Records are soft-deleted, never rewritten, and the
//! collator turns what remains into fixed-length, gap-free windows.

pub mod catalog;
pub mod cli;
pub mod collator;
pub mod config;
pub mod errors;
pub mod manifest;
pub mod observability;
pub mod record;
pub mod tub;

pub use catalog::Record;
pub use collator::{is_continuous, Collator, CollatorError, Indexed};
pub use config::{ConfigError, TubConfig};
pub use errors::{TubError, TubErrorCode, TubResult};
pub use manifest::{FieldType, Metadata, Schema};
pub use record::{AssetError, AssetResolver, FileAssetResolver, TubRecord};
pub use tub::{IndexSelection, Tub};
