//! Observability for tubs
//!
//! Structured JSON logging of typed lifecycle events. Observability is
//! read-only: it never changes what a tub does.
//!
//! ```ignore
//! use tubstore::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::RecordsDeleted, &[("count", "2")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{LogTarget, Logger, Severity};

/// Log a lifecycle event with fields at its own severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
