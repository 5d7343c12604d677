//! Domain layer for rask-log-ingest.
//!
//! Contains the canonical types shared across all modules:
//! - `LogEntry`: the write path's core data type
//! - `LogLevel`: severity (Debug/Info/Warn/Error/Fatal), totally ordered
//! - `IngestError`: top-level error type

pub mod error;
pub mod log_entry;
pub mod log_level;

pub use error::{IngestError, ValidationError};
pub use log_entry::{
    DeviceInfo, LogEntry, MAX_IDENTIFIER_LEN, MAX_MESSAGE_LEN, MAX_METADATA_KEYS, MetadataValue,
    Platform, SourceLocation,
};
pub use log_level::LogLevel;
