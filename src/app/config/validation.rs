use super::{Config, ConfigError};
use crate::protection::DataProtector;

const MAX_BUFFER_CAPACITY: usize = 100_000_000;

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate buffer
        if self.buffer.capacity == 0 || self.buffer.capacity > MAX_BUFFER_CAPACITY {
            return Err(ConfigError::InvalidConfig(format!(
                "Buffer capacity must be between 1 and {MAX_BUFFER_CAPACITY}, got {}",
                self.buffer.capacity
            )));
        }
        if self.buffer.flush_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Flush interval must be greater than 0".to_string(),
            ));
        }
        if self.buffer.flush_timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Flush timeout must be greater than 0".to_string(),
            ));
        }

        // Validate recovery
        if self.recovery.enabled {
            if self.recovery.directory.as_os_str().is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "Recovery directory must be set when recovery is enabled".to_string(),
                ));
            }
            if self.recovery.max_file_age.is_zero() || self.recovery.cleanup_interval.is_zero() {
                return Err(ConfigError::InvalidConfig(
                    "Recovery max_file_age and cleanup_interval must be greater than 0".to_string(),
                ));
            }
        }

        // Validate retention policy
        self.retention
            .policy
            .validate()
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

        // Compile protection rules so bad regexes fail at startup
        DataProtector::new(self.protection.clone())
            .map_err(|e| ConfigError::InvalidConfig(format!("Data protection: {e}")))?;
        if self.protection.audit_enabled && self.protection.audit_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "Audit directory must be set when auditing is enabled".to_string(),
            ));
        }

        // Validate health checks
        if self.health.check_interval.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Health check interval must be greater than 0".to_string(),
            ));
        }
        if self.health.unhealthy_threshold == 0 || self.health.recovery_threshold == 0 {
            return Err(ConfigError::InvalidConfig(
                "Health thresholds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
