// In-process store used for local development and tests.
// Entries are kept in a map keyed by id; queries scan and sort on demand.

use super::{
    LogDeleter, LogFilter, LogResult, LogStore, ServiceInfo, SortOrder, StoreFuture, StoreHealth,
};
use crate::domain::LogEntry;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, LogEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Snapshot of every stored entry, oldest first.
    pub fn all(&self) -> Vec<LogEntry> {
        let mut entries: Vec<LogEntry> = self.entries.read().values().cloned().collect();
        sort_entries(&mut entries, SortOrder::TimestampAsc);
        entries
    }

    fn run_query(&self, filter: &LogFilter) -> LogResult {
        let mut matched: Vec<LogEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        sort_entries(&mut matched, filter.order);

        let total_count = matched.len();
        let page: Vec<LogEntry> = matched
            .into_iter()
            .skip(filter.offset)
            .take(if filter.limit == 0 { usize::MAX } else { filter.limit })
            .collect();
        let has_more = filter.offset + page.len() < total_count;

        LogResult {
            entries: page,
            total_count,
            has_more,
        }
    }

    fn summarize_services(&self) -> Vec<ServiceInfo> {
        let entries = self.entries.read();
        let mut services: BTreeMap<(String, String), ServiceInfo> = BTreeMap::new();

        for entry in entries.values() {
            let key = (entry.service_name.clone(), entry.agent_id.clone());
            services
                .entry(key)
                .and_modify(|info| {
                    info.log_count += 1;
                    if entry.timestamp > info.last_seen {
                        info.last_seen = entry.timestamp;
                        info.platform = entry.platform;
                    }
                })
                .or_insert_with(|| ServiceInfo {
                    service_name: entry.service_name.clone(),
                    agent_id: entry.agent_id.clone(),
                    platform: entry.platform,
                    log_count: 1,
                    last_seen: entry.timestamp,
                });
        }

        services.into_values().collect()
    }
}

fn sort_entries(entries: &mut [LogEntry], order: SortOrder) {
    match order {
        SortOrder::TimestampAsc => entries.sort_by(|a, b| {
            a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id))
        }),
        SortOrder::TimestampDesc => entries.sort_by(|a, b| {
            b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id))
        }),
    }
}

impl LogStore for MemoryStore {
    fn store(&self, entries: Vec<LogEntry>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut guard = self.entries.write();
            for entry in entries {
                guard.insert(entry.id.clone(), entry);
            }
            Ok(())
        })
    }

    fn query(&self, filter: LogFilter) -> StoreFuture<'_, LogResult> {
        Box::pin(async move { Ok(self.run_query(&filter)) })
    }

    fn get_by_ids(&self, ids: Vec<String>) -> StoreFuture<'_, Vec<LogEntry>> {
        Box::pin(async move {
            let guard = self.entries.read();
            Ok(ids.iter().filter_map(|id| guard.get(id).cloned()).collect())
        })
    }

    fn get_services(&self) -> StoreFuture<'_, Vec<ServiceInfo>> {
        Box::pin(async move { Ok(self.summarize_services()) })
    }

    fn health_check(&self) -> BoxFuture<'_, StoreHealth> {
        Box::pin(async { StoreHealth::healthy() })
    }

    fn as_deleter(&self) -> Option<&dyn LogDeleter> {
        Some(self)
    }
}

impl LogDeleter for MemoryStore {
    fn delete_by_ids(&self, ids: Vec<String>) -> StoreFuture<'_, usize> {
        Box::pin(async move {
            let mut guard = self.entries.write();
            Ok(ids.iter().filter(|id| guard.remove(*id).is_some()).count())
        })
    }
}
