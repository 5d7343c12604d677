use thiserror::Error;

/// Reasons a log entry is rejected at the ingestion boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing field: {field}")]
    MissingField { field: &'static str },

    #[error("Field '{field}' too long (max length: {max_len})")]
    TooLong { field: &'static str, max_len: usize },

    #[error("Invalid character '{character}' at position {position} in '{field}'")]
    InvalidCharacter {
        field: &'static str,
        position: usize,
        character: char,
    },

    #[error("Too many metadata keys: {count} (max: {max})")]
    TooManyMetadataKeys { count: usize, max: usize },

    #[error("Metadata keys must not be blank")]
    InvalidMetadataKey,
}

/// Top-level error type for the ingestion pipeline.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Missing or invalid API key")]
    Unauthorized,

    #[error("API key '{key_name}' lacks permission '{permission}'")]
    Forbidden { key_name: String, permission: String },

    #[error("Rate limit exceeded for API key '{key_name}' ({limit} requests/minute)")]
    RateLimited { key_name: String, limit: u32 },

    #[error("Pipeline is shutting down")]
    ShuttingDown,

    #[error("Buffer error: {0}")]
    Buffer(#[from] crate::buffer::BufferError),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("Recovery error: {0}")]
    Recovery(#[from] crate::reliability::RecoveryError),

    #[error("Authorization error: {0}")]
    Auth(#[from] crate::auth::AuthError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::app::ConfigError),

    #[error("Protection error: {0}")]
    Protection(#[from] crate::protection::ProtectionError),

    #[error("Retention error: {0}")]
    Retention(#[from] crate::retention::RetentionError),
}

impl IngestError {
    /// Whether the caller may retry the same request later.
    /// Authorization and validation failures are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestError::Buffer(e) => e.is_recoverable(),
            IngestError::Storage(_) | IngestError::Recovery(_) | IngestError::ShuttingDown => true,
            IngestError::Validation(_)
            | IngestError::Unauthorized
            | IngestError::Forbidden { .. }
            | IngestError::RateLimited { .. }
            | IngestError::Auth(_)
            | IngestError::Config(_)
            | IngestError::Protection(_)
            | IngestError::Retention(_) => false,
        }
    }
}
