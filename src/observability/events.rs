//! Observable tub events
//!
//! Events are explicit and typed. Each event carries its own severity so
//! call sites never pick one ad hoc.

use std::fmt;

use super::logger::Severity;

/// Observable events in a tub's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// New manifest and catalog created
    TubCreated,
    /// Existing manifest loaded and catalog scanned
    TubOpened,
    /// Configuration file loaded
    ConfigLoaded,

    // Catalog
    /// Record appended and fsynced
    RecordAppended,
    /// Catalog rolled over to a new segment file
    SegmentRolled,
    /// Partial frame at the end of the last segment was removed
    TornTailTruncated,
    /// Reserved indices without a catalog entry were marked deleted
    MissingEntriesMarked,
    /// Append failed; the reserved index is burned
    WriteFailed,
    /// Damaged catalog bytes detected (FATAL)
    CorruptionDetected,

    // Manifest
    /// Indices added to the deletion set
    RecordsDeleted,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::TubCreated => "TUB_CREATED",
            Event::TubOpened => "TUB_OPENED",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::RecordAppended => "RECORD_APPENDED",
            Event::SegmentRolled => "SEGMENT_ROLLED",
            Event::TornTailTruncated => "TORN_TAIL_TRUNCATED",
            Event::MissingEntriesMarked => "MISSING_ENTRIES_MARKED",
            Event::WriteFailed => "WRITE_FAILED",
            Event::CorruptionDetected => "CORRUPTION_DETECTED",
            Event::RecordsDeleted => "RECORDS_DELETED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::RecordAppended => Severity::Trace,
            Event::TubCreated
            | Event::TubOpened
            | Event::ConfigLoaded
            | Event::SegmentRolled
            | Event::RecordsDeleted => Severity::Info,
            Event::TornTailTruncated | Event::MissingEntriesMarked => Severity::Warn,
            Event::WriteFailed => Severity::Error,
            Event::CorruptionDetected => Severity::Fatal,
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
