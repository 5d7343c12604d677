//! Redaction of sensitive data before entries are buffered, plus the audit
//! trail of what was changed.

pub mod audit;
pub mod config;
pub mod error;
pub mod processor;

pub use audit::{AuditAction, AuditEntry, AuditLogger};
pub use config::{DataProtectionConfig, FieldAction, FieldRule};
pub use error::ProtectionError;
pub use processor::{
    BatchProtectionReport, DataProtector, HASH_PREFIX, MAX_METADATA_DEPTH, hash_value, mask_value,
};
