//! Segment writer with fsync enforcement
//!
//! - Every append is followed by fsync
//! - The confirmed length only advances after fsync succeeds
//! - A failed append is rolled back by truncating to the confirmed length
//!
//! If the rollback itself fails the writer is poisoned and refuses further
//! appends, since the file tail is in an unknown state.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Append-only writer for one segment file
pub(crate) struct SegmentWriter {
    segment_id: u64,
    path: PathBuf,
    file: File,
    /// Bytes confirmed durable
    confirmed_len: u64,
    poisoned: bool,
    /// Fails the next append after writing this many bytes of the frame
    #[cfg(test)]
    fail_after: Option<usize>,
}

impl SegmentWriter {
    /// Opens or creates a segment file for appending.
    ///
    /// A newly created file is made durable by fsyncing its directory.
    pub(crate) fn open(segment_id: u64, path: &Path) -> io::Result<Self> {
        let existed = path.exists();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        if !existed {
            file.sync_all()?;
            if let Some(dir) = path.parent() {
                OpenOptions::new().read(true).open(dir)?.sync_all()?;
            }
        }

        let confirmed_len = file.metadata()?.len();

        Ok(Self {
            segment_id,
            path: path.to_path_buf(),
            file,
            confirmed_len,
            poisoned: false,
            #[cfg(test)]
            fail_after: None,
        })
    }

    pub(crate) fn segment_id(&self) -> u64 {
        self.segment_id
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one frame and fsyncs.
    ///
    /// # Returns
    ///
    /// The byte offset the frame starts at.
    pub(crate) fn append(&mut self, frame: &[u8]) -> io::Result<u64> {
        if self.poisoned {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "segment {} has an unrecoverable partial write",
                    self.path.display()
                ),
            ));
        }

        let offset = self.confirmed_len;
        match self.write_durable(frame) {
            Ok(()) => {
                self.confirmed_len += frame.len() as u64;
                Ok(offset)
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn write_durable(&mut self, frame: &[u8]) -> io::Result<()> {
        #[cfg(test)]
        if let Some(partial) = self.fail_after.take() {
            self.file.write_all(&frame[..partial.min(frame.len())])?;
            return Err(io::Error::new(io::ErrorKind::Other, "simulated write failure"));
        }
        self.file.write_all(frame)?;
        self.file.sync_all()
    }

    /// Makes the next append write `partial` bytes and then fail
    #[cfg(test)]
    pub(crate) fn fail_next_append(&mut self, partial: usize) {
        self.fail_after = Some(partial);
    }

    /// Drops any bytes past the confirmed length
    fn rollback(&mut self) {
        let truncated = self
            .file
            .set_len(self.confirmed_len)
            .and_then(|_| self.file.sync_all());
        if truncated.is_err() {
            self.poisoned = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::reader::read_entry_at;
    use crate::catalog::record::Record;
    use serde_json::json;
    use tempfile::TempDir;

    fn frame(index: u64) -> Vec<u8> {
        let fields = json!({"input": index}).as_object().unwrap().clone();
        Record::new(index, 0, fields).to_frame()
    }

    #[test]
    fn test_open_creates_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog_0.catalog");
        let writer = SegmentWriter::open(0, &path).unwrap();
        assert!(path.exists());
        assert_eq!(writer.segment_id(), 0);
    }

    #[test]
    fn test_append_returns_offsets() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog_0.catalog");
        let mut writer = SegmentWriter::open(0, &path).unwrap();

        let first = writer.append(&frame(0)).unwrap();
        let second = writer.append(&frame(1)).unwrap();
        assert_eq!(first, 0);
        assert_eq!(second, frame(0).len() as u64);
        assert_eq!(read_entry_at(&path, second).unwrap().index(), 1);
    }

    #[test]
    fn test_failed_append_rolls_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog_0.catalog");
        let mut writer = SegmentWriter::open(0, &path).unwrap();
        writer.append(&frame(0)).unwrap();
        let intact_len = std::fs::metadata(&path).unwrap().len();

        writer.fail_next_append(10);
        assert!(writer.append(&frame(1)).is_err());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), intact_len);

        // The next frame lands where the failed one would have
        let offset = writer.append(&frame(2)).unwrap();
        assert_eq!(offset, intact_len);
        assert_eq!(read_entry_at(&path, offset).unwrap().index(), 2);
    }

    #[test]
    fn test_reopen_continues_at_end() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("catalog_0.catalog");
        {
            let mut writer = SegmentWriter::open(0, &path).unwrap();
            writer.append(&frame(0)).unwrap();
        }
        let mut writer = SegmentWriter::open(0, &path).unwrap();
        let offset = writer.append(&frame(1)).unwrap();
        assert_eq!(offset, frame(0).len() as u64);
    }
}
