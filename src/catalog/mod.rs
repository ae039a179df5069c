//! Catalog subsystem
//!
//! The catalog is the append-only physical log of records. Records are
//! addressed by their index in one flat space; physically they are spread
//! over segment files `catalog_{n}.catalog`, where segment `n` holds the
//! index slots `[n * max_catalog_len, (n + 1) * max_catalog_len)`.
//!
//! # Invariants
//!
//! - `length() == current_index + 1` of the owning manifest
//! - An index is reserved in the manifest (durably) before its frame is
//!   written, so indices are never reused
//! - Frames are never rewritten or reordered once fsynced
//! - An index whose append failed has no entry and is soft-deleted
//! - Only the append of `current_index` can be torn: every earlier append
//!   was fsynced before the next index was reserved

mod checksum;
mod reader;
mod record;
mod writer;

pub use checksum::compute_checksum;
pub use record::{Record, INDEX_FIELD, TIMESTAMP_FIELD};

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{Map, Value};

use crate::errors::{TubError, TubResult};
use crate::manifest::Manifest;
use crate::observability::{log_event_with_fields, Event};
use reader::{read_entry_at, ScanItem, SegmentReader};
use writer::SegmentWriter;

const SEGMENT_PREFIX: &str = "catalog_";
const SEGMENT_SUFFIX: &str = ".catalog";

/// File name of segment `segment_id`
pub fn segment_file_name(segment_id: u64) -> String {
    format!("{}{}{}", SEGMENT_PREFIX, segment_id, SEGMENT_SUFFIX)
}

/// Segment id encoded in a segment file name
pub fn parse_segment_file_name(name: &str) -> Option<u64> {
    name.strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

/// Where one record lives on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EntryLocation {
    segment_id: u64,
    offset: u64,
}

/// Append-only, index-addressed record log.
pub struct Catalog {
    base_path: PathBuf,
    max_catalog_len: u64,
    /// One slot per assigned index; `None` for indices burned by a failed append
    locations: Vec<Option<EntryLocation>>,
    /// Number of `Some` slots in `locations`
    entries: u64,
    writer: Option<SegmentWriter>,
    /// Partial byte count for a simulated failure of the next append
    #[cfg(test)]
    fail_next: Option<usize>,
}

impl Catalog {
    /// Empty catalog for a freshly created manifest
    pub fn create(manifest: &Manifest) -> Self {
        Self {
            base_path: manifest.base_path().to_path_buf(),
            max_catalog_len: manifest.max_catalog_len(),
            locations: Vec::new(),
            entries: 0,
            writer: None,
            #[cfg(test)]
            fail_next: None,
        }
    }

    /// Rebuilds the catalog from the segments listed in the manifest.
    ///
    /// - A torn frame at the end of the last segment is truncated away, but
    ///   only when it can be the append of `current_index`
    /// - Indices reserved in the manifest without an entry are soft-deleted
    ///
    /// # Errors
    ///
    /// `TUB_CORRUPTION` if a listed segment is missing, a complete frame is
    /// damaged, an incomplete frame hides earlier indices, indices are out of
    /// order, or an entry lies beyond the manifest's `current_index`. Nothing
    /// is truncated in that case.
    pub fn open(manifest: &mut Manifest) -> TubResult<Self> {
        let mut catalog = Self::create(manifest);
        let assigned = manifest.assigned_count();
        catalog.locations = vec![None; assigned as usize];

        let segments = manifest.segments().to_vec();
        let mut last_index: Option<u64> = None;

        for (position, name) in segments.iter().enumerate() {
            let segment_id = parse_segment_file_name(name).ok_or_else(|| {
                TubError::corruption(format!("Invalid segment name in manifest: '{}'", name))
            })?;
            let path = catalog.base_path.join(name);
            if !path.is_file() {
                return Err(TubError::corruption(format!(
                    "Segment listed in manifest is missing: {}",
                    path.display()
                )));
            }

            let is_last = position + 1 == segments.len();
            let mut reader = SegmentReader::open(&path)?;
            loop {
                match reader.next_entry()? {
                    ScanItem::Entry { offset, record } => {
                        let index = record.index();
                        catalog.check_entry(name, offset, segment_id, index, last_index, assigned)?;
                        catalog.locations[index as usize] = Some(EntryLocation { segment_id, offset });
                        catalog.entries += 1;
                        last_index = Some(index);
                    }
                    ScanItem::TornTail { offset }
                        if is_last && catalog.is_torn_last_append(manifest, segment_id) =>
                    {
                        Self::truncate_torn_tail(reader.path(), offset)?;
                        break;
                    }
                    ScanItem::TornTail { offset } => {
                        log_event_with_fields(
                            Event::CorruptionDetected,
                            &[("segment", name.as_str()), ("byte_offset", offset.to_string().as_str())],
                        );
                        let reason = if is_last {
                            "Incomplete frame is not the last reserved append"
                        } else {
                            "Incomplete frame in a segment that is not the last"
                        };
                        return Err(TubError::corruption_at_offset(name, offset, reason));
                    }
                    ScanItem::End => break,
                }
            }
        }

        let missing: Vec<u64> = catalog
            .locations
            .iter()
            .enumerate()
            .filter(|(index, location)| {
                location.is_none() && !manifest.is_deleted(*index as u64)
            })
            .map(|(index, _)| index as u64)
            .collect();

        if !missing.is_empty() {
            let count = manifest.mark_deleted(missing.iter().copied())?;
            log_event_with_fields(
                Event::MissingEntriesMarked,
                &[("count", count.to_string().as_str()), ("first_index", missing[0].to_string().as_str())],
            );
        }

        Ok(catalog)
    }

    fn check_entry(
        &self,
        segment: &str,
        offset: u64,
        segment_id: u64,
        index: u64,
        last_index: Option<u64>,
        assigned: u64,
    ) -> TubResult<()> {
        if index >= assigned {
            return Err(TubError::corruption_at_offset(
                segment,
                offset,
                format!("Entry index {} was never reserved (assigned: {})", index, assigned),
            ));
        }
        if let Some(last) = last_index {
            if index <= last {
                return Err(TubError::corruption_at_offset(
                    segment,
                    offset,
                    format!("Entry index {} follows index {}", index, last),
                ));
            }
        }
        if index / self.max_catalog_len != segment_id {
            return Err(TubError::corruption_at_offset(
                segment,
                offset,
                format!("Entry index {} does not belong in segment {}", index, segment_id),
            ));
        }
        Ok(())
    }

    /// Whether an incomplete frame met while scanning `segment_id` can be the
    /// interrupted append of `current_index`.
    ///
    /// That append happens last, so `current_index` must live in this segment,
    /// have no entry yet, and every lower index must already have an entry or
    /// be deleted.
    fn is_torn_last_append(&self, manifest: &Manifest, segment_id: u64) -> bool {
        let assigned = manifest.assigned_count();
        if assigned == 0 {
            return false;
        }
        let last = assigned - 1;
        last / self.max_catalog_len == segment_id
            && self.locations[last as usize].is_none()
            && self.locations[..last as usize]
                .iter()
                .enumerate()
                .all(|(index, location)| location.is_some() || manifest.is_deleted(index as u64))
    }

    fn truncate_torn_tail(path: &Path, offset: u64) -> TubResult<()> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| TubError::catalog_io(format!("Failed to open {} for repair", path.display()), e))?;
        file.set_len(offset)
            .and_then(|_| file.sync_all())
            .map_err(|e| TubError::catalog_io(format!("Failed to truncate torn tail of {}", path.display()), e))?;

        log_event_with_fields(
            Event::TornTailTruncated,
            &[("byte_offset", offset.to_string().as_str()), ("segment", path.display().to_string().as_str())],
        );
        Ok(())
    }

    /// Number of index slots, deleted or not
    pub fn length(&self) -> u64 {
        self.locations.len() as u64
    }

    /// Number of index slots holding a physical entry
    pub fn entry_count(&self) -> u64 {
        self.entries
    }

    /// Whether `index` has a physical entry
    pub fn contains(&self, index: u64) -> bool {
        matches!(self.locations.get(index as usize), Some(Some(_)))
    }

    /// Segments per configured slot count
    pub fn max_catalog_len(&self) -> u64 {
        self.max_catalog_len
    }

    /// Appends a record durably and returns its index.
    ///
    /// 1. Serialize fields
    /// 2. Reserve the next index in the manifest (persisted)
    /// 3. Write the frame to segment `index / max_catalog_len` and fsync
    ///
    /// # Errors
    ///
    /// `TUB_WRITE_FAILURE` if the frame cannot be written. The reserved index
    /// is burned: it stays counted in `length()`, has no entry, and is
    /// soft-deleted so no reader ever sees it.
    pub fn append(&mut self, manifest: &mut Manifest, fields: &Map<String, Value>) -> TubResult<u64> {
        let body = serde_json::to_vec(fields)
            .map_err(|e| TubError::invalid_record(format!("Failed to serialize fields: {}", e)))?;

        let index = manifest.reserve_next_index()?;
        self.locations.push(None);

        let timestamp_ms = Utc::now().timestamp_millis();
        let frame = Record::encode_frame(index, timestamp_ms, &body);

        match self.write_frame(manifest, index, &frame) {
            Ok(location) => {
                self.locations[index as usize] = Some(location);
                self.entries += 1;
                log_event_with_fields(
                    Event::RecordAppended,
                    &[("index", index.to_string().as_str()), ("segment_id", location.segment_id.to_string().as_str())],
                );
                Ok(index)
            }
            Err(e) => {
                log_event_with_fields(
                    Event::WriteFailed,
                    &[("index", index.to_string().as_str()), ("error", e.to_string().as_str())],
                );
                // If this fails too the slot stays a hole until the next open
                // marks it; readers skip holes either way
                if let Err(mark_err) = manifest.mark_deleted([index]) {
                    log_event_with_fields(
                        Event::WriteFailed,
                        &[
                            ("index", index.to_string().as_str()),
                            ("stage", "mark_deleted"),
                            ("error", mark_err.to_string().as_str()),
                        ],
                    );
                }
                Err(e)
            }
        }
    }

    fn write_frame(&mut self, manifest: &mut Manifest, index: u64, frame: &[u8]) -> TubResult<EntryLocation> {
        let segment_id = index / self.max_catalog_len;
        #[cfg(test)]
        let fail_next = self.fail_next.take();
        let writer = self.writer_for(manifest, segment_id)?;
        #[cfg(test)]
        if let Some(partial) = fail_next {
            writer.fail_next_append(partial);
        }
        let offset = writer.append(frame).map_err(|e| {
            TubError::write_failure(
                format!("Failed to append record at index {}", index),
                e,
            )
            .with_details(format!("segment: {}", writer.path().display()))
        })?;
        Ok(EntryLocation { segment_id, offset })
    }

    /// Writer for `segment_id`, creating and registering the segment if new
    fn writer_for(&mut self, manifest: &mut Manifest, segment_id: u64) -> TubResult<&mut SegmentWriter> {
        let reuse = matches!(&self.writer, Some(w) if w.segment_id() == segment_id);
        if !reuse {
            let name = segment_file_name(segment_id);
            let path = self.base_path.join(&name);
            let writer = SegmentWriter::open(segment_id, &path).map_err(|e| {
                TubError::write_failure(format!("Failed to open segment {}", path.display()), e)
            })?;

            if !manifest.segments().iter().any(|s| s == &name) {
                manifest.record_segment(name.clone())?;
                log_event_with_fields(Event::SegmentRolled, &[("segment", name.as_str())]);
            }
            self.writer = Some(writer);
        }

        self.writer
            .as_mut()
            .ok_or_else(|| TubError::corruption("Segment writer missing after open"))
    }

    /// Reads the record stored at `index`.
    ///
    /// Deletion is not consulted here; see `Tub` for filtered reads.
    ///
    /// # Errors
    ///
    /// `TUB_NOT_FOUND` if `index >= length()` or the index has no entry.
    pub fn read(&self, index: u64) -> TubResult<Record> {
        let location = match self.locations.get(index as usize) {
            None => return Err(TubError::index_not_found(index, self.length())),
            Some(None) => {
                return Err(TubError::not_found(format!(
                    "Index {} was reserved but never written",
                    index
                )))
            }
            Some(Some(location)) => *location,
        };

        let path = self.base_path.join(segment_file_name(location.segment_id));
        let record = read_entry_at(&path, location.offset)?;
        if record.index() != index {
            return Err(TubError::corruption_at_offset(
                &segment_file_name(location.segment_id),
                location.offset,
                format!("Expected index {}, found {}", index, record.index()),
            ));
        }
        Ok(record)
    }

    /// Makes the next append write `partial` bytes of its frame and fail
    #[cfg(test)]
    pub(crate) fn fail_next_append(&mut self, partial: usize) {
        self.fail_next = Some(partial);
    }

    /// Reserves an index and leaves its slot empty without deleting it, as
    /// when both the append and its follow-up `mark_deleted` fail
    #[cfg(test)]
    pub(crate) fn reserve_unwritten(&mut self, manifest: &mut Manifest) -> TubResult<u64> {
        let index = manifest.reserve_next_index()?;
        self.locations.push(None);
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TubErrorCode;
    use crate::manifest::{Metadata, Schema};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn fields(value: i64) -> Map<String, Value> {
        json!({ "input": value }).as_object().unwrap().clone()
    }

    fn new_manifest(dir: &Path, max_catalog_len: u64) -> Manifest {
        let schema = Schema::parse(&["input"], &["int"]).unwrap();
        Manifest::create(dir, schema, Metadata::new(), max_catalog_len).unwrap()
    }

    #[test]
    fn test_segment_names() {
        assert_eq!(segment_file_name(3), "catalog_3.catalog");
        assert_eq!(parse_segment_file_name("catalog_12.catalog"), Some(12));
        assert_eq!(parse_segment_file_name("manifest.json"), None);
    }

    #[test]
    fn test_append_assigns_sequential_indices() {
        let temp_dir = TempDir::new().unwrap();
        let mut manifest = new_manifest(temp_dir.path(), 1000);
        let mut catalog = Catalog::create(&manifest);

        for expected in 0..5 {
            assert_eq!(catalog.append(&mut manifest, &fields(expected)).unwrap(), expected as u64);
        }
        assert_eq!(catalog.length(), 5);
        assert_eq!(manifest.current_index(), 4);
        assert_eq!(catalog.read(3).unwrap().get("input"), Some(&json!(3)));
    }

    #[test]
    fn test_read_out_of_range() {
        let temp_dir = TempDir::new().unwrap();
        let mut manifest = new_manifest(temp_dir.path(), 1000);
        let mut catalog = Catalog::create(&manifest);
        catalog.append(&mut manifest, &fields(0)).unwrap();

        let err = catalog.read(1).unwrap_err();
        assert_eq!(err.code(), TubErrorCode::NotFound);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_segments_roll_at_max_len() {
        let temp_dir = TempDir::new().unwrap();
        let mut manifest = new_manifest(temp_dir.path(), 3);
        let mut catalog = Catalog::create(&manifest);

        for i in 0..7 {
            catalog.append(&mut manifest, &fields(i)).unwrap();
        }

        assert_eq!(
            manifest.segments(),
            &["catalog_0.catalog", "catalog_1.catalog", "catalog_2.catalog"]
        );
        for i in 0..7 {
            assert_eq!(catalog.read(i).unwrap().index(), i);
        }
    }

    #[test]
    fn test_open_rebuilds_locations() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut manifest = new_manifest(temp_dir.path(), 4);
            let mut catalog = Catalog::create(&manifest);
            for i in 0..10 {
                catalog.append(&mut manifest, &fields(i)).unwrap();
            }
        }

        let mut manifest = Manifest::load(temp_dir.path()).unwrap();
        let mut catalog = Catalog::open(&mut manifest).unwrap();
        assert_eq!(catalog.length(), 10);
        assert_eq!(catalog.read(9).unwrap().get("input"), Some(&json!(9)));

        assert_eq!(catalog.append(&mut manifest, &fields(10)).unwrap(), 10);
        assert_eq!(catalog.read(10).unwrap().index(), 10);
    }

    #[test]
    fn test_open_truncates_torn_tail() {
        let temp_dir = TempDir::new().unwrap();
        let segment = temp_dir.path().join("catalog_0.catalog");
        let intact_len;
        {
            let mut manifest = new_manifest(temp_dir.path(), 1000);
            let mut catalog = Catalog::create(&manifest);
            catalog.append(&mut manifest, &fields(0)).unwrap();
            catalog.append(&mut manifest, &fields(1)).unwrap();
            intact_len = fs::metadata(&segment).unwrap().len();
            catalog.append(&mut manifest, &fields(2)).unwrap();
        }

        // Simulate a crash halfway through the last append
        let file = fs::OpenOptions::new().write(true).open(&segment).unwrap();
        file.set_len(intact_len + 7).unwrap();
        drop(file);

        let mut manifest = Manifest::load(temp_dir.path()).unwrap();
        let catalog = Catalog::open(&mut manifest).unwrap();

        assert_eq!(fs::metadata(&segment).unwrap().len(), intact_len);
        assert_eq!(catalog.length(), 3);
        assert!(catalog.contains(1));
        assert!(!catalog.contains(2));
        assert!(manifest.is_deleted(2));
        assert_eq!(catalog.read(2).unwrap_err().code(), TubErrorCode::NotFound);
    }

    #[test]
    fn test_open_marks_reserved_but_unwritten_index() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut manifest = new_manifest(temp_dir.path(), 1000);
            let mut catalog = Catalog::create(&manifest);
            catalog.append(&mut manifest, &fields(0)).unwrap();
            // Crash between reservation and append
            manifest.reserve_next_index().unwrap();
        }

        let mut manifest = Manifest::load(temp_dir.path()).unwrap();
        let mut catalog = Catalog::open(&mut manifest).unwrap();
        assert_eq!(catalog.length(), 2);
        assert!(manifest.is_deleted(1));

        // The burned index is never reused
        assert_eq!(catalog.append(&mut manifest, &fields(2)).unwrap(), 2);
    }

    #[test]
    fn test_failed_append_burns_index() {
        let temp_dir = TempDir::new().unwrap();
        let segment = temp_dir.path().join("catalog_0.catalog");
        let mut manifest = new_manifest(temp_dir.path(), 1000);
        let mut catalog = Catalog::create(&manifest);
        catalog.append(&mut manifest, &fields(0)).unwrap();
        let intact_len = fs::metadata(&segment).unwrap().len();

        catalog.fail_next_append(9);
        let err = catalog.append(&mut manifest, &fields(1)).unwrap_err();
        assert_eq!(err.code(), TubErrorCode::WriteFailure);
        assert_eq!(fs::metadata(&segment).unwrap().len(), intact_len);
        assert_eq!(catalog.length(), 2);
        assert_eq!(catalog.entry_count(), 1);
        assert!(manifest.is_deleted(1));
        assert_eq!(catalog.read(1).unwrap_err().code(), TubErrorCode::NotFound);

        assert_eq!(catalog.append(&mut manifest, &fields(2)).unwrap(), 2);
        drop(catalog);

        let mut manifest = Manifest::load(temp_dir.path()).unwrap();
        let catalog = Catalog::open(&mut manifest).unwrap();
        assert_eq!(catalog.length(), 3);
        assert!(!catalog.contains(1));
        assert_eq!(catalog.read(2).unwrap().get("input"), Some(&json!(2)));
    }

    #[test]
    fn test_open_rejects_damaged_length_without_truncating() {
        let temp_dir = TempDir::new().unwrap();
        let segment = temp_dir.path().join("catalog_0.catalog");
        {
            let mut manifest = new_manifest(temp_dir.path(), 1000);
            let mut catalog = Catalog::create(&manifest);
            for i in 0..3 {
                catalog.append(&mut manifest, &fields(i)).unwrap();
            }
        }

        // A huge length on the first frame looks like an incomplete frame
        let mut bytes = fs::read(&segment).unwrap();
        bytes[3] ^= 0x40;
        fs::write(&segment, &bytes).unwrap();

        let mut manifest = Manifest::load(temp_dir.path()).unwrap();
        let err = Catalog::open(&mut manifest).err().unwrap();
        assert_eq!(err.code(), TubErrorCode::Corruption);
        assert_eq!(fs::read(&segment).unwrap(), bytes);
        assert!(!manifest.is_deleted(0));
    }

    #[test]
    fn test_open_detects_damaged_frame() {
        let temp_dir = TempDir::new().unwrap();
        let segment = temp_dir.path().join("catalog_0.catalog");
        {
            let mut manifest = new_manifest(temp_dir.path(), 1000);
            let mut catalog = Catalog::create(&manifest);
            catalog.append(&mut manifest, &fields(0)).unwrap();
            catalog.append(&mut manifest, &fields(1)).unwrap();
        }

        let mut bytes = fs::read(&segment).unwrap();
        bytes[21] ^= 0xFF;
        fs::write(&segment, bytes).unwrap();

        let mut manifest = Manifest::load(temp_dir.path()).unwrap();
        let err = Catalog::open(&mut manifest).err().unwrap();
        assert_eq!(err.code(), TubErrorCode::Corruption);
    }

    #[test]
    fn test_open_detects_missing_segment() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut manifest = new_manifest(temp_dir.path(), 1000);
            let mut catalog = Catalog::create(&manifest);
            catalog.append(&mut manifest, &fields(0)).unwrap();
        }
        fs::remove_file(temp_dir.path().join("catalog_0.catalog")).unwrap();

        let mut manifest = Manifest::load(temp_dir.path()).unwrap();
        let err = Catalog::open(&mut manifest).err().unwrap();
        assert_eq!(err.code(), TubErrorCode::Corruption);
    }
}
