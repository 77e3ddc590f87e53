//! SQLite-backed adapters for the Event Store and write-sink ports.

pub mod sinks;
pub mod sqlite_event_store;

pub use sinks::{SqliteInspectionSink, SqliteNoticeRecordSink, SqliteThirdPartyAlertSink};
pub use sqlite_event_store::SqliteEventStore;
