use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to gather entropy for a new API key: {0}")]
    Entropy(String),

    #[error("API key name must not be blank")]
    InvalidName,

    #[error("API key must grant at least one permission")]
    NoPermissions,

    #[error("Unknown permission '{0}'")]
    UnknownPermission(String),

    #[error("API key not found")]
    NotFound,

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse API key file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize API key file: {0}")]
    Serialize(#[from] toml::ser::Error),
}
