//! Segment reader
//!
//! Sequential scanning is used once at open time to rebuild the index →
//! location table. Point reads seek straight to a known offset.
//!
//! A frame cut short at the very end of a file is reported as a torn tail,
//! not as an error: it is what an interrupted append leaves behind. Any other
//! damage is corruption.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::record::{FrameError, Record, MIN_FRAME_SIZE};
use crate::errors::{TubError, TubResult};

/// Result of scanning one more frame
#[derive(Debug)]
pub(crate) enum ScanItem {
    /// A complete, verified frame starting at `offset`
    Entry { offset: u64, record: Record },
    /// An incomplete frame starts at `offset` and runs to end of file
    TornTail { offset: u64 },
    /// Clean end of file
    End,
}

/// Sequential reader over one segment file
pub(crate) struct SegmentReader {
    path: PathBuf,
    name: String,
    reader: BufReader<File>,
    current_offset: u64,
    file_size: u64,
}

impl SegmentReader {
    /// Opens a segment file for scanning
    pub(crate) fn open(path: &Path) -> TubResult<Self> {
        let file = File::open(path).map_err(|e| {
            TubError::catalog_io(format!("Failed to open segment: {}", path.display()), e)
        })?;
        let file_size = file
            .metadata()
            .map_err(|e| TubError::catalog_io("Failed to read segment metadata", e))?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            name: segment_display_name(path),
            reader: BufReader::new(file),
            current_offset: 0,
            file_size,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the next frame.
    ///
    /// # Errors
    ///
    /// `TUB_CORRUPTION` on an invalid frame length, a checksum mismatch or
    /// unparseable fields.
    pub(crate) fn next_entry(&mut self) -> TubResult<ScanItem> {
        if self.current_offset >= self.file_size {
            return Ok(ScanItem::End);
        }

        let offset = self.current_offset;
        let remaining = self.file_size - offset;
        if remaining < 4 {
            return Ok(ScanItem::TornTail { offset });
        }

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            TubError::catalog_io(format!("Failed to read frame length at {}", offset), e)
        })?;
        let frame_len = Record::frame_len(len_buf);

        if frame_len < MIN_FRAME_SIZE {
            return Err(TubError::corruption_at_offset(
                &self.name,
                offset,
                format!("Invalid frame length {}", frame_len),
            ));
        }
        if frame_len as u64 > remaining {
            return Ok(ScanItem::TornTail { offset });
        }

        let mut frame = vec![0u8; frame_len];
        frame[..4].copy_from_slice(&len_buf);
        self.reader.read_exact(&mut frame[4..]).map_err(|e| {
            TubError::catalog_io(format!("Failed to read frame body at {}", offset), e)
        })?;

        let (record, consumed) = Record::decode_frame(&frame)
            .map_err(|e| TubError::corruption_at_offset(&self.name, offset, e.to_string()))?;

        self.current_offset += consumed as u64;
        Ok(ScanItem::Entry { offset, record })
    }
}

/// Reads the single frame stored at `offset` of a segment file
pub(crate) fn read_entry_at(path: &Path, offset: u64) -> TubResult<Record> {
    let name = segment_display_name(path);
    let mut file = File::open(path).map_err(|e| {
        TubError::catalog_io(format!("Failed to open segment: {}", path.display()), e)
    })?;
    file.seek(SeekFrom::Start(offset)).map_err(|e| {
        TubError::catalog_io(format!("Failed to seek to {} in {}", offset, name), e)
    })?;

    let mut len_buf = [0u8; 4];
    file.read_exact(&mut len_buf)
        .map_err(|e| read_error(&name, offset, e))?;
    let frame_len = Record::frame_len(len_buf);
    if frame_len < MIN_FRAME_SIZE {
        return Err(TubError::corruption_at_offset(
            &name,
            offset,
            format!("Invalid frame length {}", frame_len),
        ));
    }

    let mut frame = vec![0u8; frame_len];
    frame[..4].copy_from_slice(&len_buf);
    file.read_exact(&mut frame[4..])
        .map_err(|e| read_error(&name, offset, e))?;

    Record::decode_frame(&frame)
        .map(|(record, _)| record)
        .map_err(|e: FrameError| TubError::corruption_at_offset(&name, offset, e.to_string()))
}

fn read_error(name: &str, offset: u64, e: io::Error) -> TubError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        TubError::corruption_at_offset(name, offset, "Frame runs past end of segment")
    } else {
        TubError::catalog_io(format!("Failed to read frame at {} in {}", offset, name), e)
    }
}

fn segment_display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
