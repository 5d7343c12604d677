//! Write path orchestration.
//!
//! `ingest` runs authenticate → authorize → rate-limit → validate → protect →
//! buffer on the caller's thread. A background loop drains the buffer into
//! the `LogStore`; a batch the store refuses goes to a recovery file, and if
//! that also fails it is re-admitted to the buffer.

use crate::auth::{ApiKeyAuthority, AuthMode, Permission, RateLimiter};
use crate::buffer::{AddOutcome, BackpressureLevel, BufferError, LogBuffer};
use crate::domain::{IngestError, LogEntry};
use crate::protection::DataProtector;
use crate::reliability::RecoveryManager;
use crate::storage::{LogStore, StorageError};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Bundled collaborators for [`IngestPipeline::new`].
pub struct PipelineComponents {
    pub buffer: Arc<LogBuffer>,
    pub store: Arc<dyn LogStore>,
    pub recovery: Option<Arc<RecoveryManager>>,
    pub authority: Arc<ApiKeyAuthority>,
    pub protector: Arc<DataProtector>,
    pub rate_limiter: RateLimiter,
    pub flush_timeout: Duration,
}

/// What happened to one `ingest` request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    pub accepted: usize,
    /// Older buffered entries dropped to admit this request.
    pub evicted: usize,
    /// Entries refused by a full buffer under the reject policy.
    pub rejected: usize,
    /// Entries discarded because protection failed on them.
    pub unprotected_dropped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Empty,
    Stored(usize),
    /// Storage failed; the batch was written to a recovery file.
    Recovered { entries: usize, path: PathBuf },
    /// Storage and recovery both failed; the batch went back into the buffer.
    Requeued { entries: usize, dropped: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub requests: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub evicted: u64,
    pub unprotected_dropped: u64,
    pub flushed: u64,
    pub flush_failures: u64,
    pub recovered_to_disk: u64,
    pub replayed: u64,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    evicted: AtomicU64,
    unprotected_dropped: AtomicU64,
    flushed: AtomicU64,
    flush_failures: AtomicU64,
    recovered_to_disk: AtomicU64,
    replayed: AtomicU64,
}

fn bump(counter: &AtomicU64, n: usize) {
    counter.fetch_add(n as u64, Ordering::Relaxed);
}

pub struct IngestPipeline {
    buffer: Arc<LogBuffer>,
    store: Arc<dyn LogStore>,
    recovery: Option<Arc<RecoveryManager>>,
    authority: Arc<ApiKeyAuthority>,
    protector: Arc<DataProtector>,
    rate_limiter: RateLimiter,
    flush_timeout: Duration,
    // `true` while open. Held shared from the admission check through
    // `buffer.add`, exclusively when closing, so the final drain sees every
    // accepted entry.
    admission: RwLock<bool>,
    // One flush at a time, so batches reach storage in buffer order.
    flush_lock: Mutex<()>,
    pressure: Notify,
    counters: Counters,
}

impl IngestPipeline {
    pub fn new(components: PipelineComponents) -> Self {
        let PipelineComponents {
            buffer,
            store,
            recovery,
            authority,
            protector,
            rate_limiter,
            flush_timeout,
        } = components;

        Self {
            buffer,
            store,
            recovery,
            authority,
            protector,
            rate_limiter,
            flush_timeout,
            admission: RwLock::new(true),
            flush_lock: Mutex::new(()),
            pressure: Notify::new(),
            counters: Counters::default(),
        }
    }

    pub fn buffer(&self) -> &Arc<LogBuffer> {
        &self.buffer
    }

    pub fn is_accepting(&self) -> bool {
        *self.admission.read()
    }

    /// Admits a batch of entries on behalf of `api_key`.
    ///
    /// Any invalid entry rejects the whole request. Entries the protector
    /// fails on are discarded and counted, never stored unredacted. Fails
    /// with `BufferError::Full` only when the buffer refused every entry.
    pub fn ingest(
        &self,
        api_key: Option<&str>,
        mut entries: Vec<LogEntry>,
    ) -> Result<IngestReceipt, IngestError> {
        if !self.is_accepting() {
            return Err(IngestError::ShuttingDown);
        }
        bump(&self.counters.requests, 1);

        let key = self
            .authority
            .validate_api_key(api_key.unwrap_or_default())
            .ok_or(IngestError::Unauthorized)?;

        if !key.has_permission(Permission::IngestLogs) {
            warn!(key_name = %key.info.name, "API key lacks ingest permission");
            return Err(IngestError::Forbidden {
                key_name: key.info.name,
                permission: Permission::IngestLogs.to_string(),
            });
        }

        if key.mode == AuthMode::Verified
            && !self
                .rate_limiter
                .try_acquire(&key.key_hash, key.info.rate_limit)
        {
            warn!(key_name = %key.info.name, limit = key.info.rate_limit, "Rate limit exceeded");
            return Err(IngestError::RateLimited {
                key_name: key.info.name,
                limit: key.info.rate_limit,
            });
        }

        for entry in &entries {
            entry.validate()?;
        }

        let mut receipt = IngestReceipt::default();
        if entries.is_empty() {
            return Ok(receipt);
        }

        let report = self.protector.process_batch(&mut entries);
        if !report.failed_ids.is_empty() {
            let failed: HashSet<&str> = report.failed_ids.iter().map(String::as_str).collect();
            let before = entries.len();
            entries.retain(|entry| !failed.contains(entry.id.as_str()));
            receipt.unprotected_dropped = before - entries.len();
        }

        let offered = entries.len();
        let admission = self.admission.read();
        if !*admission {
            return Err(IngestError::ShuttingDown);
        }
        for entry in entries {
            match self.buffer.add(entry) {
                Ok(AddOutcome::Accepted) => receipt.accepted += 1,
                Ok(AddOutcome::EvictedOldest) => {
                    receipt.accepted += 1;
                    receipt.evicted += 1;
                }
                Err(BufferError::Full { .. }) => receipt.rejected += 1,
                Err(e) => return Err(e.into()),
            }
        }
        drop(admission);

        bump(&self.counters.accepted, receipt.accepted);
        bump(&self.counters.rejected, receipt.rejected);
        bump(&self.counters.evicted, receipt.evicted);
        bump(&self.counters.unprotected_dropped, receipt.unprotected_dropped);

        if self.buffer.backpressure_level() == BackpressureLevel::High {
            self.pressure.notify_one();
        }

        if offered > 0 && receipt.accepted == 0 {
            return Err(BufferError::Full {
                capacity: self.buffer.capacity(),
            }
            .into());
        }

        debug!(
            key_name = %key.info.name,
            accepted = receipt.accepted,
            evicted = receipt.evicted,
            rejected = receipt.rejected,
            "Ingested batch"
        );
        Ok(receipt)
    }

    /// Drains the buffer into storage once.
    pub async fn flush_once(&self) -> FlushOutcome {
        let _guard = self.flush_lock.lock().await;

        let batch = self.buffer.flush();
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }
        let count = batch.len();

        let failure =
            match tokio::time::timeout(self.flush_timeout, self.store.store(batch.clone())).await {
                Ok(Ok(())) => {
                    bump(&self.counters.flushed, count);
                    debug!(entries = count, "Flushed batch to storage");
                    return FlushOutcome::Stored(count);
                }
                Ok(Err(e)) => e,
                Err(_) => StorageError::Timeout(self.flush_timeout),
            };

        bump(&self.counters.flush_failures, 1);
        warn!(entries = count, error = %failure, "Flush to storage failed");

        if let Some(recovery) = &self.recovery {
            match recovery.save_pending_logs(&batch).await {
                Ok(Some(path)) => {
                    bump(&self.counters.recovered_to_disk, count);
                    info!(
                        entries = count,
                        path = %path.display(),
                        "Saved failed batch to recovery file"
                    );
                    return FlushOutcome::Recovered {
                        entries: count,
                        path,
                    };
                }
                Ok(None) => {}
                Err(e) => error!(entries = count, "Failed to save recovery file: {e}"),
            }
        }

        let dropped = self.buffer.requeue(batch);
        FlushOutcome::Requeued {
            entries: count,
            dropped,
        }
    }

    /// Re-buffers everything found in the recovery directory. Returns the
    /// number of entries replayed.
    pub async fn replay_recovered(&self, cancel: &CancellationToken) -> Result<usize, IngestError> {
        let Some(recovery) = &self.recovery else {
            return Ok(0);
        };

        let outcome = recovery.recover_pending_logs(cancel).await?;
        for skipped in &outcome.skipped {
            warn!(
                path = %skipped.path.display(),
                reason = %skipped.reason,
                "Recovery file left in place"
            );
        }

        let count = outcome.entries.len();
        if count > 0 {
            let dropped = self.buffer.requeue(outcome.entries);
            bump(&self.counters.replayed, count);
            info!(
                entries = count,
                files = outcome.files_recovered,
                dropped,
                "Replayed recovered entries into the buffer"
            );
        }
        Ok(count)
    }

    /// Flushes every `interval`, or early when the buffer reports high
    /// pressure, until `cancel` fires.
    pub fn spawn_flush_loop(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            info!(interval = ?interval, "Flush loop started");
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                    () = pipeline.pressure.notified() => {
                        debug!("Buffer under pressure, flushing early");
                    }
                }
                pipeline.flush_once().await;
            }
            info!("Flush loop shutdown complete");
        })
    }

    /// Stops admitting entries and performs the final flush. Returns once
    /// in-flight `ingest` calls have finished buffering, so nothing accepted
    /// is left behind.
    pub async fn shutdown(&self) -> FlushOutcome {
        *self.admission.write() = false;
        let outcome = self.flush_once().await;
        match &outcome {
            FlushOutcome::Requeued { entries, .. } => {
                error!(
                    entries,
                    "Final flush failed and no recovery file was written; entries will be lost"
                );
            }
            FlushOutcome::Recovered { entries, path } => {
                info!(entries, path = %path.display(), "Final flush routed to recovery");
            }
            FlushOutcome::Stored(entries) => info!(entries, "Final flush stored"),
            FlushOutcome::Empty => {}
        }
        outcome
    }

    pub fn stats(&self) -> PipelineStats {
        let c = &self.counters;
        PipelineStats {
            requests: c.requests.load(Ordering::Relaxed),
            accepted: c.accepted.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            evicted: c.evicted.load(Ordering::Relaxed),
            unprotected_dropped: c.unprotected_dropped.load(Ordering::Relaxed),
            flushed: c.flushed.load(Ordering::Relaxed),
            flush_failures: c.flush_failures.load(Ordering::Relaxed),
            recovered_to_disk: c.recovered_to_disk.load(Ordering::Relaxed),
            replayed: c.replayed.load(Ordering::Relaxed),
        }
    }
}
