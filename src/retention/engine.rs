use super::RetentionError;
use super::policy::RetentionPolicy;
use crate::domain::LogLevel;
use crate::storage::{LogDeleter, LogFilter, LogStore, SortOrder};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A non-fatal problem hit during one cleanup pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    /// What was being cleaned, e.g. `level DEBUG` or `service checkout/agent-1`.
    pub scope: String,
    pub error: RetentionError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupResult {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_deleted: u64,
    pub deleted_by_level: BTreeMap<LogLevel, u64>,
    pub deleted_by_count: u64,
    pub errors: Vec<CleanupFailure>,
}

impl CleanupResult {
    fn begin() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            total_deleted: 0,
            deleted_by_level: BTreeMap::new(),
            deleted_by_count: 0,
            errors: Vec::new(),
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    fn record_error(&mut self, scope: impl Into<String>, error: RetentionError) {
        let scope = scope.into();
        tracing::warn!(scope = %scope, error = %error, "Retention cleanup step failed");
        self.errors.push(CleanupFailure { scope, error });
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Folds a later pass into this one.
    pub fn merge(mut self, other: CleanupResult) -> Self {
        self.finished_at = self.finished_at.max(other.finished_at);
        self.total_deleted += other.total_deleted;
        for (level, count) in other.deleted_by_level {
            *self.deleted_by_level.entry(level).or_default() += count;
        }
        self.deleted_by_count += other.deleted_by_count;
        self.errors.extend(other.errors);
        self
    }
}

/// Applies a `RetentionPolicy` to a `LogStore`.
pub struct RetentionEngine {
    store: Arc<dyn LogStore>,
    policy: RwLock<RetentionPolicy>,
}

impl RetentionEngine {
    pub fn new(store: Arc<dyn LogStore>, policy: RetentionPolicy) -> Result<Self, RetentionError> {
        policy.validate()?;
        Ok(Self {
            store,
            policy: RwLock::new(policy),
        })
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy.read().clone()
    }

    /// Replaces the active policy. An invalid policy leaves the old one in place.
    pub fn update_policy(&self, policy: RetentionPolicy) -> Result<(), RetentionError> {
        policy.validate()?;
        *self.policy.write() = policy;
        tracing::info!("Retention policy updated");
        Ok(())
    }

    /// Deletes entries older than their level's retention window.
    pub async fn cleanup_expired_logs(&self) -> CleanupResult {
        let policy = self.policy();
        let mut result = CleanupResult::begin();

        let Some(deleter) = self.store.as_deleter() else {
            result.record_error("age", RetentionError::DeleteUnsupported);
            return result.finish();
        };

        let now = Utc::now();
        for level in LogLevel::ALL {
            let days = policy.retention_days(level);
            if days <= 0 {
                continue;
            }
            let cutoff = now - chrono::Duration::days(days);
            let filter = LogFilter {
                level: Some(level),
                end_time: Some(cutoff),
                ..LogFilter::default()
            };

            match self
                .delete_oldest(deleter, filter, u64::MAX, policy.batch_size)
                .await
            {
                Ok(deleted) => {
                    if deleted > 0 {
                        tracing::info!(log_level = %level, deleted, cutoff = %cutoff, "Deleted expired logs");
                        result.deleted_by_level.insert(level, deleted);
                        result.total_deleted += deleted;
                    }
                }
                Err(e) => result.record_error(format!("level {level}"), e),
            }
        }

        result.finish()
    }

    /// Trims the oldest entries beyond `max_total_logs`, then beyond
    /// `max_logs_per_service` for each (service, agent) pair.
    pub async fn cleanup_by_count(&self) -> CleanupResult {
        let policy = self.policy();
        let mut result = CleanupResult::begin();

        if policy.max_total_logs == 0 && policy.max_logs_per_service == 0 {
            return result.finish();
        }

        let Some(deleter) = self.store.as_deleter() else {
            result.record_error("count", RetentionError::DeleteUnsupported);
            return result.finish();
        };

        if policy.max_total_logs > 0 {
            match self.store.get_services().await {
                Ok(services) => {
                    let total: u64 = services.iter().map(|s| s.log_count).sum();
                    if total > policy.max_total_logs {
                        let excess = total - policy.max_total_logs;
                        match self
                            .delete_oldest(deleter, LogFilter::default(), excess, policy.batch_size)
                            .await
                        {
                            Ok(deleted) => {
                                tracing::info!(total, limit = policy.max_total_logs, deleted, "Trimmed logs over total limit");
                                result.deleted_by_count += deleted;
                                result.total_deleted += deleted;
                            }
                            Err(e) => result.record_error("total", e),
                        }
                    }
                }
                Err(e) => result.record_error("total", e.into()),
            }
        }

        if policy.max_logs_per_service > 0 {
            // Counts are re-read because the total pass may have changed them.
            match self.store.get_services().await {
                Ok(services) => {
                    for service in services {
                        if service.log_count <= policy.max_logs_per_service {
                            continue;
                        }
                        let excess = service.log_count - policy.max_logs_per_service;
                        let filter = LogFilter {
                            service_name: Some(service.service_name.clone()),
                            agent_id: Some(service.agent_id.clone()),
                            ..LogFilter::default()
                        };
                        let scope = format!("service {}/{}", service.service_name, service.agent_id);
                        match self
                            .delete_oldest(deleter, filter, excess, policy.batch_size)
                            .await
                        {
                            Ok(deleted) => {
                                tracing::info!(
                                    service = %service.service_name,
                                    agent = %service.agent_id,
                                    deleted,
                                    "Trimmed logs over per-service limit"
                                );
                                result.deleted_by_count += deleted;
                                result.total_deleted += deleted;
                            }
                            Err(e) => result.record_error(scope, e),
                        }
                    }
                }
                Err(e) => result.record_error("per-service", e.into()),
            }
        }

        result.finish()
    }

    /// Age-based cleanup followed by count-based cleanup.
    pub async fn run_cleanup(&self) -> CleanupResult {
        let by_age = self.cleanup_expired_logs().await;
        let by_count = self.cleanup_by_count().await;
        by_age.merge(by_count)
    }

    /// Deletes up to `max` of the oldest entries matching `filter`, in
    /// batches of `batch_size`. Stops early when a batch comes back short or
    /// a delete removes nothing.
    async fn delete_oldest(
        &self,
        deleter: &dyn LogDeleter,
        mut filter: LogFilter,
        max: u64,
        batch_size: usize,
    ) -> Result<u64, RetentionError> {
        filter.order = SortOrder::TimestampAsc;
        filter.offset = 0;

        let mut deleted_total = 0u64;
        while deleted_total < max {
            let remaining = usize::try_from(max - deleted_total).unwrap_or(usize::MAX);
            filter.limit = batch_size.min(remaining);

            let batch = self.store.query(filter.clone()).await?;
            let fetched = batch.entries.len();
            if fetched == 0 {
                break;
            }

            let ids = batch.entries.into_iter().map(|e| e.id).collect();
            let deleted = deleter.delete_by_ids(ids).await?;
            deleted_total += deleted as u64;

            if deleted == 0 || fetched < filter.limit {
                break;
            }
        }
        Ok(deleted_total)
    }
}
