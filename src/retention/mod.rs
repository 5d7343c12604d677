//! Age- and count-based deletion of stored entries.

pub mod engine;
pub mod policy;
pub mod scheduler;

pub use engine::{CleanupFailure, CleanupResult, RetentionEngine};
pub use policy::{DEFAULT_BATCH_SIZE, RetentionPolicy};
pub use scheduler::RetentionScheduler;

use crate::storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetentionError {
    #[error("Invalid retention policy: {0}")]
    InvalidPolicy(String),

    #[error("Storage backend does not support deletion")]
    DeleteUnsupported,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
