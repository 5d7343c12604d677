use super::backpressure::{BackpressureLevel, OverflowPolicy};
use super::error::BufferError;
use super::metrics::BufferMetrics;
use crate::domain::LogEntry;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Result of a successful `LogBuffer::add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Accepted,
    /// The buffer was full and its oldest entry was dropped to make room.
    EvictedOldest,
}

/// Bounded FIFO of log entries waiting to be flushed to storage.
///
/// All access to the queue goes through a single mutex. Counters are atomics
/// so `metrics()` never contends with writers for longer than a length read.
pub struct LogBuffer {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    overflow_policy: OverflowPolicy,
    added: AtomicU64,
    evicted: AtomicU64,
    rejected: AtomicU64,
    flushed: AtomicU64,
    peak_size: AtomicUsize,
}

impl LogBuffer {
    pub fn new(capacity: usize, overflow_policy: OverflowPolicy) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::InvalidCapacity { capacity });
        }

        // Prevent excessive up-front allocation
        if capacity > 100_000_000 {
            return Err(BufferError::InvalidCapacity { capacity });
        }

        Ok(Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(65_536))),
            capacity,
            overflow_policy,
            added: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            flushed: AtomicU64::new(0),
            peak_size: AtomicUsize::new(0),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity
    }

    /// Appends an entry. Never blocks beyond the internal lock.
    ///
    /// At capacity the configured `OverflowPolicy` decides between evicting
    /// the oldest entry and refusing this one.
    pub fn add(&self, entry: LogEntry) -> Result<AddOutcome, BufferError> {
        let (outcome, len) = {
            let mut entries = self.entries.lock();
            let outcome = if entries.len() >= self.capacity {
                match self.overflow_policy {
                    OverflowPolicy::DropOldest => {
                        entries.pop_front();
                        AddOutcome::EvictedOldest
                    }
                    OverflowPolicy::Reject => {
                        drop(entries);
                        self.rejected.fetch_add(1, Ordering::Relaxed);
                        return Err(BufferError::Full {
                            capacity: self.capacity,
                        });
                    }
                }
            } else {
                AddOutcome::Accepted
            };
            entries.push_back(entry);
            (outcome, entries.len())
        };

        self.added.fetch_add(1, Ordering::Relaxed);
        if outcome == AddOutcome::EvictedOldest {
            let total = self.evicted.fetch_add(1, Ordering::Relaxed) + 1;
            // One warning per thousand evictions keeps sustained overload visible
            // without flooding the diagnostic log.
            if total == 1 || total % 1000 == 0 {
                tracing::warn!(
                    capacity = self.capacity,
                    evicted_total = total,
                    "Ingestion buffer full, evicting oldest entries"
                );
            }
        }
        self.update_peak_size(len);

        Ok(outcome)
    }

    /// Atomically empties the buffer and returns its contents in FIFO order.
    ///
    /// Entries added after the swap land in the fresh queue and belong to the
    /// next flush.
    pub fn flush(&self) -> Vec<LogEntry> {
        let drained = std::mem::take(&mut *self.entries.lock());
        if !drained.is_empty() {
            self.flushed
                .fetch_add(drained.len() as u64, Ordering::Relaxed);
        }
        Vec::from(drained)
    }

    /// Puts a batch that could not be persisted back at the front of the
    /// queue, ahead of anything added since it was flushed.
    ///
    /// If the combined size exceeds capacity the oldest entries are dropped.
    /// Returns how many were dropped.
    pub fn requeue(&self, batch: Vec<LogEntry>) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let requeued = batch.len() as u64;

        let (dropped, len) = {
            let mut entries = self.entries.lock();
            let mut merged = VecDeque::with_capacity(batch.len() + entries.len());
            merged.extend(batch);
            merged.extend(entries.drain(..));

            let overflow = merged.len().saturating_sub(self.capacity);
            if overflow > 0 {
                merged.drain(..overflow);
            }
            *entries = merged;
            (overflow, entries.len())
        };

        tracing::debug!(requeued, "Requeued failed batch");
        if dropped > 0 {
            self.evicted.fetch_add(dropped as u64, Ordering::Relaxed);
            tracing::warn!(dropped, "Dropped oldest entries while requeueing a failed batch");
        }
        self.update_peak_size(len);
        dropped
    }

    pub fn metrics(&self) -> BufferMetrics {
        BufferMetrics {
            capacity: self.capacity,
            len: self.size(),
            added: self.added.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            flushed: self.flushed.load(Ordering::Relaxed),
            peak_size: self.peak_size.load(Ordering::Relaxed),
        }
    }

    pub fn backpressure_level(&self) -> BackpressureLevel {
        BackpressureLevel::from_fill_ratio(self.size() as f64 / self.capacity as f64)
    }

    fn update_peak_size(&self, current_size: usize) {
        let mut peak = self.peak_size.load(Ordering::Relaxed);
        while current_size > peak {
            match self.peak_size.compare_exchange_weak(
                peak,
                current_size,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => peak = x,
            }
        }
    }
}

impl std::fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.size())
            .field("overflow_policy", &self.overflow_policy)
            .field("evicted", &self.evicted.load(Ordering::Relaxed))
            .finish()
    }
}
