// Append-only audit trail of redactions, one JSON object per line in
// `audit-YYYY-MM-DD.jsonl` (UTC day). When the file cannot be written the
// entry goes to tracing under the "audit" target with original values removed.

use super::config::FieldAction;
use crate::domain::LogEntry;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditAction {
    /// Dotted path for nested metadata, `message` for message scanning.
    pub field: String,
    pub action: FieldAction,
    pub original_value: String,
    /// `None` when the field was dropped.
    pub new_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub log_id: String,
    pub service_name: String,
    pub agent_id: String,
    pub actions: Vec<AuditAction>,
}

impl AuditEntry {
    pub fn new(entry: &LogEntry, actions: Vec<AuditAction>) -> Self {
        Self {
            timestamp: Utc::now(),
            log_id: entry.id.clone(),
            service_name: entry.service_name.clone(),
            agent_id: entry.agent_id.clone(),
            actions,
        }
    }

    fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for action in &mut copy.actions {
            action.original_value = REDACTED.to_string();
        }
        copy
    }
}

struct OpenSink {
    date: NaiveDate,
    file: File,
}

pub struct AuditLogger {
    dir: PathBuf,
    sink: Mutex<Option<OpenSink>>,
}

impl AuditLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sink: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("audit-{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Appends `entry`. Never fails the caller.
    pub fn record(&self, entry: &AuditEntry) {
        let result = serde_json::to_string(entry)
            .map_err(std::io::Error::other)
            .and_then(|line| self.append_line(&line));

        if let Err(e) = result {
            let fallback = serde_json::to_string(&entry.redacted()).unwrap_or_default();
            tracing::warn!(
                target: "audit",
                error = %e,
                dir = %self.dir.display(),
                entry = %fallback,
                "Audit sink unavailable, audit entry logged instead"
            );
        }
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let today = Utc::now().date_naive();
        let mut sink = self.sink.lock();

        if sink.as_ref().is_none_or(|s| s.date != today) {
            std::fs::create_dir_all(&self.dir)?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.file_path_for(today))?;
            *sink = Some(OpenSink { date: today, file });
        }

        let Some(open) = sink.as_mut() else {
            return Err(std::io::Error::other("audit sink not open"));
        };
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        if let Err(e) = open.file.write_all(&buf).and_then(|()| open.file.flush()) {
            // Reopen on the next record.
            *sink = None;
            return Err(e);
        }
        Ok(())
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger").field("dir", &self.dir).finish()
    }
}
