pub mod groups;
pub mod serde_helpers;
mod validation;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_helpers::{load_env_millis, load_env_path, load_env_path_opt, load_env_string, load_env_var};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub use groups::{
    AuthConfig, BufferConfig, HealthSettings, LoggingConfig, RecoveryConfig, RetentionConfig,
};

use crate::protection::DataProtectionConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error on {path}: {source}")]
    FileError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Environment error: {0}")]
    EnvError(String),
}

/// Verbosity of the service's own diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogVerbosity {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogVerbosity> for tracing::Level {
    fn from(level: LogVerbosity) -> Self {
        match level {
            LogVerbosity::Error => tracing::Level::ERROR,
            LogVerbosity::Warn => tracing::Level::WARN,
            LogVerbosity::Info => tracing::Level::INFO,
            LogVerbosity::Debug => tracing::Level::DEBUG,
            LogVerbosity::Trace => tracing::Level::TRACE,
        }
    }
}

impl fmt::Display for LogVerbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogVerbosity::Error => "error",
            LogVerbosity::Warn => "warn",
            LogVerbosity::Info => "info",
            LogVerbosity::Debug => "debug",
            LogVerbosity::Trace => "trace",
        })
    }
}

impl FromStr for LogVerbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogVerbosity as ValueEnum>::from_str(s, true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line (default, production)
    #[default]
    Json,
    /// Human-readable text
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogFormat as ValueEnum>::from_str(s, true)
    }
}

/// Complete service configuration, one TOML table per concern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub buffer: BufferConfig,
    pub recovery: RecoveryConfig,
    pub retention: RetentionConfig,
    pub auth: AuthConfig,
    pub protection: DataProtectionConfig,
    pub health: HealthSettings,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// File (or defaults), then `RASK_INGEST_*` overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        load_env_var("RASK_INGEST_LOG_LEVEL", &mut self.logging.level)?;
        load_env_var("RASK_INGEST_LOG_FORMAT", &mut self.logging.format)?;

        load_env_var("RASK_INGEST_BUFFER_CAPACITY", &mut self.buffer.capacity)?;
        load_env_millis("RASK_INGEST_FLUSH_INTERVAL_MS", &mut self.buffer.flush_interval)?;
        load_env_millis("RASK_INGEST_FLUSH_TIMEOUT_MS", &mut self.buffer.flush_timeout)?;
        if let Ok(policy) = std::env::var("RASK_INGEST_OVERFLOW_POLICY") {
            self.buffer.overflow_policy = match policy.to_lowercase().as_str() {
                "drop_oldest" => crate::buffer::OverflowPolicy::DropOldest,
                "reject" => crate::buffer::OverflowPolicy::Reject,
                _ => {
                    return Err(ConfigError::EnvError(format!(
                        "Invalid RASK_INGEST_OVERFLOW_POLICY: {policy}. Valid values: drop_oldest, reject"
                    )));
                }
            };
        }

        load_env_var("RASK_INGEST_RECOVERY_ENABLED", &mut self.recovery.enabled)?;
        load_env_path("RASK_INGEST_RECOVERY_DIR", &mut self.recovery.directory);

        load_env_var("RASK_INGEST_RETENTION_ENABLED", &mut self.retention.enabled)?;
        load_env_var(
            "RASK_INGEST_RETENTION_DEFAULT_DAYS",
            &mut self.retention.policy.default_days,
        )?;

        load_env_var("RASK_INGEST_REQUIRE_AUTH", &mut self.auth.require_auth)?;
        load_env_path_opt("RASK_INGEST_KEYS_FILE", &mut self.auth.keys_file);

        load_env_var("RASK_INGEST_PROTECTION_ENABLED", &mut self.protection.enabled)?;
        load_env_string("RASK_INGEST_HASH_SALT", &mut self.protection.hash_salt);
        load_env_var("RASK_INGEST_AUDIT_ENABLED", &mut self.protection.audit_enabled)?;
        load_env_path("RASK_INGEST_AUDIT_DIR", &mut self.protection.audit_dir);

        Ok(())
    }
}
