//! Shared test support for integration tests.
#![allow(dead_code)]

use futures::future::BoxFuture;
use rask_log_ingest::domain::{LogEntry, LogLevel, Platform};
use rask_log_ingest::storage::{
    LogDeleter, LogFilter, LogResult, LogStore, MemoryStore, ServiceInfo, StorageError,
    StoreFuture, StoreHealth,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub fn entry(service: &str, level: LogLevel, message: &str) -> LogEntry {
    LogEntry::new(service, "agent-1", level, message, Platform::Rust)
}

/// Store wrapper whose writes can be made to fail or hang.
///
/// Reads and deletes always go to the inner `MemoryStore`.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    should_fail: AtomicBool,
    should_stall: AtomicBool,
    store_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_should_stall(&self, stall: bool) {
        self.should_stall.store(stall, Ordering::SeqCst);
    }

    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

impl LogStore for FlakyStore {
    fn store(&self, entries: Vec<LogEntry>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.store_calls.fetch_add(1, Ordering::SeqCst);
            if self.should_stall.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.should_fail.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("Mock store failure".to_string()));
            }
            self.inner.store(entries).await
        })
    }

    fn query(&self, filter: LogFilter) -> StoreFuture<'_, LogResult> {
        self.inner.query(filter)
    }

    fn get_by_ids(&self, ids: Vec<String>) -> StoreFuture<'_, Vec<LogEntry>> {
        self.inner.get_by_ids(ids)
    }

    fn get_services(&self) -> StoreFuture<'_, Vec<ServiceInfo>> {
        self.inner.get_services()
    }

    fn health_check(&self) -> BoxFuture<'_, StoreHealth> {
        Box::pin(async move {
            if self.should_fail.load(Ordering::SeqCst) {
                StoreHealth::unhealthy("Mock store failure")
            } else {
                StoreHealth::healthy()
            }
        })
    }

    fn as_deleter(&self) -> Option<&dyn LogDeleter> {
        Some(&self.inner)
    }
}

/// Read/write store without the delete capability.
#[derive(Default)]
pub struct AppendOnlyStore {
    inner: MemoryStore,
}

impl AppendOnlyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl LogStore for AppendOnlyStore {
    fn store(&self, entries: Vec<LogEntry>) -> StoreFuture<'_, ()> {
        self.inner.store(entries)
    }

    fn query(&self, filter: LogFilter) -> StoreFuture<'_, LogResult> {
        self.inner.query(filter)
    }

    fn get_by_ids(&self, ids: Vec<String>) -> StoreFuture<'_, Vec<LogEntry>> {
        self.inner.get_by_ids(ids)
    }

    fn get_services(&self) -> StoreFuture<'_, Vec<ServiceInfo>> {
        self.inner.get_services()
    }

    fn health_check(&self) -> BoxFuture<'_, StoreHealth> {
        self.inner.health_check()
    }
}
