use super::{LogFormat, LogVerbosity};
use crate::buffer::OverflowPolicy;
use crate::reliability::HealthConfig;
use crate::retention::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogVerbosity,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogVerbosity::Info,
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub capacity: usize,
    pub overflow_policy: OverflowPolicy,
    #[serde(with = "super::serde_helpers")]
    pub flush_interval: Duration,
    /// Upper bound for one `LogStore::store` call.
    #[serde(with = "super::serde_helpers")]
    pub flush_timeout: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            overflow_policy: OverflowPolicy::DropOldest,
            flush_interval: Duration::from_secs(1),
            flush_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    #[serde(with = "super::serde_helpers")]
    pub max_file_age: Duration,
    #[serde(with = "super::serde_helpers")]
    pub cleanup_interval: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: PathBuf::from("./data/recovery"),
            max_file_age: Duration::from_secs(7 * 24 * 3600),
            cleanup_interval: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub policy: RetentionPolicy,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: RetentionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Overrides the flag stored in the key file.
    pub require_auth: bool,
    /// Without a key file keys live in memory only.
    pub keys_file: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            keys_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    #[serde(with = "super::serde_helpers")]
    pub check_interval: Duration,
    pub unhealthy_threshold: u32,
    pub recovery_threshold: u32,
}

impl Default for HealthSettings {
    fn default() -> Self {
        let defaults = HealthConfig::default();
        Self {
            check_interval: defaults.check_interval,
            unhealthy_threshold: defaults.unhealthy_threshold,
            recovery_threshold: defaults.recovery_threshold,
        }
    }
}

impl From<&HealthSettings> for HealthConfig {
    fn from(settings: &HealthSettings) -> Self {
        HealthConfig {
            check_interval: settings.check_interval,
            unhealthy_threshold: settings.unhealthy_threshold,
            recovery_threshold: settings.recovery_threshold,
        }
    }
}
