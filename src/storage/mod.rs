//! Contract between the ingestion core and the persisted log store.
//!
//! The storage engine itself lives outside this crate. The traits use boxed
//! futures instead of `async fn` so they stay dyn-compatible and can be held
//! as `Arc<dyn LogStore>`.

pub mod memory;

pub use memory::MemoryStore;

use crate::domain::{LogEntry, LogLevel, Platform};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage operation timed out after {0:?}")]
    Timeout(Duration),
}

pub type StoreFuture<'a, T> = BoxFuture<'a, Result<T, StorageError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    TimestampAsc,
    #[default]
    TimestampDesc,
}

/// Query shape understood by every store.
///
/// `start_time` is inclusive and `end_time` exclusive. A `limit` of zero
/// means no limit. Stores must honor `order` explicitly; callers such as
/// count-based retention rely on ascending order to find the oldest rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogFilter {
    pub service_name: Option<String>,
    pub agent_id: Option<String>,
    pub level: Option<LogLevel>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub message_contains: Option<String>,
    pub platform: Option<Platform>,
    pub limit: usize,
    pub offset: usize,
    pub order: SortOrder,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(service) = &self.service_name
            && entry.service_name != *service
        {
            return false;
        }
        if let Some(agent) = &self.agent_id
            && entry.agent_id != *agent
        {
            return false;
        }
        if let Some(level) = self.level
            && entry.level != level
        {
            return false;
        }
        if let Some(start) = self.start_time
            && entry.timestamp < start
        {
            return false;
        }
        if let Some(end) = self.end_time
            && entry.timestamp >= end
        {
            return false;
        }
        if let Some(needle) = &self.message_contains
            && !entry.message.contains(needle.as_str())
        {
            return false;
        }
        if let Some(platform) = self.platform
            && entry.platform != platform
        {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogResult {
    pub entries: Vec<LogEntry>,
    pub total_count: usize,
    pub has_more: bool,
}

/// Per (service, agent) summary. `log_count` drives count-based retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub service_name: String,
    pub agent_id: String,
    pub platform: Platform,
    pub log_count: u64,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHealth {
    pub healthy: bool,
    pub message: Option<String>,
}

impl StoreHealth {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            message: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: Some(message.into()),
        }
    }
}

/// Persisted log collection consumed by the flush path, retention and the
/// query surface.
pub trait LogStore: Send + Sync {
    fn store(&self, entries: Vec<LogEntry>) -> StoreFuture<'_, ()>;

    fn query(&self, filter: LogFilter) -> StoreFuture<'_, LogResult>;

    fn get_by_ids(&self, ids: Vec<String>) -> StoreFuture<'_, Vec<LogEntry>>;

    fn get_services(&self) -> StoreFuture<'_, Vec<ServiceInfo>>;

    fn health_check(&self) -> BoxFuture<'_, StoreHealth>;

    /// Optional deletion capability. Stores that cannot delete return `None`
    /// and retention reports `RetentionError::DeleteUnsupported`.
    fn as_deleter(&self) -> Option<&dyn LogDeleter> {
        None
    }
}

pub trait LogDeleter: Send + Sync {
    /// Deletes the given ids and returns how many rows were removed.
    fn delete_by_ids(&self, ids: Vec<String>) -> StoreFuture<'_, usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_filter_time_range_is_half_open() {
        let now = Utc::now();
        let entry = LogEntry::new("svc", "a1", LogLevel::Info, "hello", Platform::Go)
            .with_timestamp(now);

        let filter = LogFilter {
            start_time: Some(now),
            end_time: Some(now + ChronoDuration::seconds(1)),
            ..LogFilter::default()
        };
        assert!(filter.matches(&entry));

        let filter = LogFilter {
            end_time: Some(now),
            ..LogFilter::default()
        };
        assert!(!filter.matches(&entry));
    }

    #[test]
    fn test_filter_fields() {
        let entry = LogEntry::new("svc", "a1", LogLevel::Warn, "disk almost full", Platform::Python);
        let filter = LogFilter {
            service_name: Some("svc".into()),
            level: Some(LogLevel::Warn),
            message_contains: Some("almost".into()),
            platform: Some(Platform::Python),
            ..LogFilter::default()
        };
        assert!(filter.matches(&entry));

        let filter = LogFilter {
            agent_id: Some("a2".into()),
            ..LogFilter::default()
        };
        assert!(!filter.matches(&entry));
    }
}
