//! Catalog records and their on-disk frame
//!
//! Frame layout (all integers little-endian):
//!
//! ```text
//! +------------------+
//! | Frame Length     | (u32, whole frame including this field)
//! +------------------+
//! | Index            | (u64)
//! +------------------+
//! | Timestamp ms     | (i64, Unix epoch)
//! +------------------+
//! | Fields           | (JSON object, UTF-8)
//! +------------------+
//! | Checksum         | (u32, CRC32 of all preceding bytes)
//! +------------------+
//! ```

use serde_json::{Map, Value};
use thiserror::Error;

use super::checksum::{compute_checksum, verify_checksum};

/// System field carrying the record index
pub const INDEX_FIELD: &str = "_index";

/// System field carrying the write timestamp
pub const TIMESTAMP_FIELD: &str = "_timestamp_ms";

pub(crate) const HEADER_SIZE: usize = 4 + 8 + 8;
pub(crate) const CHECKSUM_SIZE: usize = 4;
pub(crate) const MIN_FRAME_SIZE: usize = HEADER_SIZE + CHECKSUM_SIZE;

/// Why a frame could not be decoded
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum FrameError {
    #[error("frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("invalid frame length {0}")]
    InvalidLength(usize),

    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("malformed fields: {0}")]
    MalformedFields(String),
}

/// One stored record: user fields plus the system-assigned index and
/// timestamp. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    index: u64,
    timestamp_ms: i64,
    fields: Map<String, Value>,
}

impl Record {
    pub(crate) fn new(index: u64, timestamp_ms: i64, fields: Map<String, Value>) -> Self {
        Self {
            index,
            timestamp_ms,
            fields,
        }
    }

    /// The record's permanent index
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Milliseconds since the Unix epoch at write time
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    /// User fields in write order
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Value of one user field
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Fields plus `_index` and `_timestamp_ms` as one JSON object
    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert(INDEX_FIELD.to_string(), Value::from(self.index));
        object.insert(TIMESTAMP_FIELD.to_string(), Value::from(self.timestamp_ms));
        Value::Object(object)
    }

    /// Builds a complete frame around already-serialized fields
    pub(crate) fn encode_frame(index: u64, timestamp_ms: i64, body: &[u8]) -> Vec<u8> {
        let frame_len = HEADER_SIZE + body.len() + CHECKSUM_SIZE;
        let mut buf = Vec::with_capacity(frame_len);

        buf.extend_from_slice(&(frame_len as u32).to_le_bytes());
        buf.extend_from_slice(&index.to_le_bytes());
        buf.extend_from_slice(&timestamp_ms.to_le_bytes());
        buf.extend_from_slice(body);

        let checksum = compute_checksum(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf
    }

    #[cfg(test)]
    pub(crate) fn to_frame(&self) -> Vec<u8> {
        let body = serde_json::to_vec(&self.fields).unwrap();
        Self::encode_frame(self.index, self.timestamp_ms, &body)
    }

    /// Reads the declared frame length from the first four bytes
    pub(crate) fn frame_len(prefix: [u8; 4]) -> usize {
        u32::from_le_bytes(prefix) as usize
    }

    /// Decodes one frame from the start of `buf`.
    ///
    /// Returns the record and the number of bytes consumed.
    pub(crate) fn decode_frame(buf: &[u8]) -> Result<(Self, usize), FrameError> {
        if buf.len() < 4 {
            return Err(FrameError::Truncated {
                needed: 4,
                available: buf.len(),
            });
        }

        let frame_len = Self::frame_len([buf[0], buf[1], buf[2], buf[3]]);
        if frame_len < MIN_FRAME_SIZE {
            return Err(FrameError::InvalidLength(frame_len));
        }
        if buf.len() < frame_len {
            return Err(FrameError::Truncated {
                needed: frame_len,
                available: buf.len(),
            });
        }

        let frame = &buf[..frame_len];
        let checksum_offset = frame_len - CHECKSUM_SIZE;
        let mut stored = [0u8; 4];
        stored.copy_from_slice(&frame[checksum_offset..]);
        let stored = u32::from_le_bytes(stored);
        if !verify_checksum(&frame[..checksum_offset], stored) {
            return Err(FrameError::ChecksumMismatch {
                stored,
                computed: compute_checksum(&frame[..checksum_offset]),
            });
        }

        let mut index = [0u8; 8];
        index.copy_from_slice(&frame[4..12]);
        let mut timestamp = [0u8; 8];
        timestamp.copy_from_slice(&frame[12..20]);

        let fields: Map<String, Value> = serde_json::from_slice(&frame[HEADER_SIZE..checksum_offset])
            .map_err(|e| FrameError::MalformedFields(e.to_string()))?;

        Ok((
            Self::new(u64::from_le_bytes(index), i64::from_le_bytes(timestamp), fields),
            frame_len,
        ))
    }
}
