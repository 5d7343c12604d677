use super::RetentionError;
use crate::domain::LogLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// How long entries are kept and how many may exist.
///
/// `level_days` keys are level names (`debug`, `ERROR`, ...). A retention of
/// zero or fewer days disables age-based deletion for that level, and a
/// count limit of zero means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub default_days: i64,
    pub level_days: BTreeMap<String, i64>,
    pub max_total_logs: u64,
    pub max_logs_per_service: u64,
    pub batch_size: usize,
    #[serde(with = "crate::app::config::serde_helpers")]
    pub interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            default_days: 30,
            level_days: BTreeMap::new(),
            max_total_logs: 0,
            max_logs_per_service: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            interval: Duration::from_secs(3600),
        }
    }
}

impl RetentionPolicy {
    pub fn with_level_days(mut self, level: LogLevel, days: i64) -> Self {
        self.level_days.insert(level.as_str().to_lowercase(), days);
        self
    }

    /// Effective retention for `level`: its override if present, otherwise
    /// `default_days`.
    pub fn retention_days(&self, level: LogLevel) -> i64 {
        self.level_days
            .iter()
            .find(|(name, _)| name.parse::<LogLevel>().is_ok_and(|l| l == level))
            .map(|(_, days)| *days)
            .unwrap_or(self.default_days)
    }

    pub fn validate(&self) -> Result<(), RetentionError> {
        if self.batch_size == 0 {
            return Err(RetentionError::InvalidPolicy(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(RetentionError::InvalidPolicy(
                "interval must be greater than 0".to_string(),
            ));
        }

        let mut seen = Vec::with_capacity(self.level_days.len());
        for name in self.level_days.keys() {
            let level: LogLevel = name.parse().map_err(|_| {
                RetentionError::InvalidPolicy(format!("unknown log level '{name}' in level_days"))
            })?;
            if seen.contains(&level) {
                return Err(RetentionError::InvalidPolicy(format!(
                    "log level '{level}' configured more than once"
                )));
            }
            seen.push(level);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_override_wins() {
        let policy = RetentionPolicy::default()
            .with_level_days(LogLevel::Debug, 7)
            .with_level_days(LogLevel::Error, 90);
        assert_eq!(policy.retention_days(LogLevel::Debug), 7);
        assert_eq!(policy.retention_days(LogLevel::Error), 90);
        assert_eq!(policy.retention_days(LogLevel::Info), 30);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_override_keys_are_case_insensitive() {
        let mut policy = RetentionPolicy::default();
        policy.level_days.insert("FATAL".to_string(), 365);
        assert_eq!(policy.retention_days(LogLevel::Fatal), 365);
    }

    #[test]
    fn test_invalid_policies() {
        let policy = RetentionPolicy {
            batch_size: 0,
            ..RetentionPolicy::default()
        };
        assert!(matches!(policy.validate(), Err(RetentionError::InvalidPolicy(_))));

        let mut policy = RetentionPolicy::default();
        policy.level_days.insert("verbose".to_string(), 1);
        assert!(policy.validate().is_err());

        let mut policy = RetentionPolicy::default();
        policy.level_days.insert("warn".to_string(), 1);
        policy.level_days.insert("WARNING".to_string(), 2);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_policy_from_toml() {
        let policy: RetentionPolicy = toml::from_str(
            r#"
            default_days = 14
            max_total_logs = 1000000
            interval = 60000

            [level_days]
            debug = 3
            "#,
        )
        .unwrap();
        assert_eq!(policy.default_days, 14);
        assert_eq!(policy.retention_days(LogLevel::Debug), 3);
        assert_eq!(policy.interval, Duration::from_secs(60));
        assert_eq!(policy.batch_size, DEFAULT_BATCH_SIZE);
    }
}
