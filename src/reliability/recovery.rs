use crate::domain::LogEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const FILE_PREFIX: &str = "recovery_";
const FILE_EXTENSION: &str = ".json";
const TEMP_SUFFIX: &str = ".tmp";
const FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RecoveryError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        RecoveryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Serialize)]
struct RecoveryFileRef<'a> {
    version: u32,
    saved_at: DateTime<Utc>,
    entry_count: usize,
    entries: &'a [LogEntry],
}

#[derive(Deserialize)]
struct RecoveryFile {
    #[allow(dead_code)]
    version: u32,
    #[allow(dead_code)]
    saved_at: DateTime<Utc>,
    entry_count: usize,
    entries: Vec<LogEntry>,
}

/// A recovery file that could not be replayed and was left on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct RecoveryOutcome {
    /// Entries from every successfully parsed file; file order follows file
    /// names, order within a file is the original flush order.
    pub entries: Vec<LogEntry>,
    pub files_recovered: usize,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryStats {
    pub file_count: usize,
    pub total_size: u64,
    pub oldest_file_time: Option<DateTime<Utc>>,
    pub newest_file_time: Option<DateTime<Utc>>,
}

/// Persists batches that could not reach storage and replays them after a
/// restart.
///
/// Every save creates a new file (written to a temp name, synced, then
/// renamed), so a file on disk is either complete or was never visible. A
/// file is deleted only after it has been parsed in full.
pub struct RecoveryManager {
    directory: PathBuf,
    lock: Mutex<()>,
}

impl RecoveryManager {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Writes `entries` to a new recovery file and returns its path.
    /// An empty batch writes nothing.
    pub async fn save_pending_logs(
        &self,
        entries: &[LogEntry],
    ) -> Result<Option<PathBuf>, RecoveryError> {
        if entries.is_empty() {
            return Ok(None);
        }

        let _guard = self.lock.lock().await;

        fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| RecoveryError::io(&self.directory, e))?;

        let saved_at = Utc::now();
        let payload = serde_json::to_vec(&RecoveryFileRef {
            version: FORMAT_VERSION,
            saved_at,
            entry_count: entries.len(),
            entries,
        })?;

        let file_name = format!(
            "{FILE_PREFIX}{}_{}{FILE_EXTENSION}",
            saved_at.format("%Y%m%d_%H%M%S_%9f"),
            Uuid::new_v4().simple()
        );
        let final_path = self.directory.join(&file_name);
        let temp_path = self.directory.join(format!("{file_name}{TEMP_SUFFIX}"));

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| RecoveryError::io(&temp_path, e))?;
        file.write_all(&payload)
            .await
            .map_err(|e| RecoveryError::io(&temp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| RecoveryError::io(&temp_path, e))?;
        drop(file);

        fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| RecoveryError::io(&final_path, e))?;

        tracing::info!(
            path = %final_path.display(),
            entries = entries.len(),
            bytes = payload.len(),
            "Saved pending logs to recovery file"
        );
        Ok(Some(final_path))
    }

    /// Replays every recognized recovery file.
    ///
    /// Corrupt files are skipped, logged and left in place for an operator.
    /// Cancellation is checked between files; unprocessed files stay on disk.
    pub async fn recover_pending_logs(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RecoveryOutcome, RecoveryError> {
        let _guard = self.lock.lock().await;
        let mut outcome = RecoveryOutcome::default();

        let files = self.list_recovery_files().await?;
        for path in files {
            if cancel.is_cancelled() {
                tracing::info!("Recovery cancelled, remaining files left for the next start");
                break;
            }

            match read_recovery_file(&path).await {
                Ok(entries) => {
                    let count = entries.len();
                    outcome.entries.extend(entries);
                    outcome.files_recovered += 1;

                    if let Err(e) = fs::remove_file(&path).await {
                        // Replaying it again later duplicates rather than loses entries.
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Recovered file could not be removed"
                        );
                    }
                    tracing::info!(path = %path.display(), entries = count, "Recovered pending logs");
                }
                Err(reason) => {
                    tracing::warn!(
                        path = %path.display(),
                        reason = %reason,
                        "Skipping unreadable recovery file"
                    );
                    outcome.skipped.push(SkippedFile { path, reason });
                }
            }
        }

        Ok(outcome)
    }

    /// Deletes recovery files (and abandoned temp files) older than `max_age`,
    /// whether or not they were ever replayed.
    pub async fn cleanup_old_recovery_files(&self, max_age: Duration) -> Result<usize, RecoveryError> {
        let _guard = self.lock.lock().await;

        let mut dir = match fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(RecoveryError::io(&self.directory, e)),
        };

        let now = SystemTime::now();
        let mut deleted = 0;

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| RecoveryError::io(&self.directory, e))?
        {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let is_temp = name.starts_with(FILE_PREFIX)
                && name.ends_with(&format!("{FILE_EXTENSION}{TEMP_SUFFIX}"));
            if !(is_recovery_file_name(name) || is_temp) {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();

            if age > max_age {
                match fs::remove_file(&path).await {
                    Ok(()) => {
                        deleted += 1;
                        tracing::warn!(path = %path.display(), age = ?age, "Removed expired recovery file");
                    }
                    Err(e) => {
                        tracing::error!(path = %path.display(), error = %e, "Failed to remove recovery file");
                    }
                }
            }
        }

        if deleted > 0 {
            tracing::info!(deleted, "Cleaned up old recovery files");
        }
        Ok(deleted)
    }

    pub async fn recovery_stats(&self) -> Result<RecoveryStats, RecoveryError> {
        let _guard = self.lock.lock().await;
        let mut stats = RecoveryStats::default();

        for path in self.list_recovery_files().await? {
            let Ok(metadata) = fs::metadata(&path).await else {
                continue;
            };
            stats.file_count += 1;
            stats.total_size += metadata.len();

            if let Ok(modified) = metadata.modified() {
                let modified: DateTime<Utc> = modified.into();
                if stats.oldest_file_time.is_none_or(|t| modified < t) {
                    stats.oldest_file_time = Some(modified);
                }
                if stats.newest_file_time.is_none_or(|t| modified > t) {
                    stats.newest_file_time = Some(modified);
                }
            }
        }

        Ok(stats)
    }

    /// Runs `cleanup_old_recovery_files(max_age)` every `interval` until
    /// `cancel` fires.
    pub fn spawn_cleanup_loop(
        self: Arc<Self>,
        interval: Duration,
        max_age: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                dir = %self.directory.display(),
                interval = ?interval,
                max_age = ?max_age,
                "Recovery cleanup started"
            );
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {
                        if let Err(e) = self.cleanup_old_recovery_files(max_age).await {
                            tracing::error!("Recovery cleanup error: {e}");
                        }
                    }
                }
            }
            tracing::info!("Recovery cleanup shutdown complete");
        })
    }

    /// Recognized recovery files sorted by name, which is creation order.
    async fn list_recovery_files(&self) -> Result<Vec<PathBuf>, RecoveryError> {
        let mut dir = match fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RecoveryError::io(&self.directory, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| RecoveryError::io(&self.directory, e))?
        {
            if let Some(file_name) = entry.file_name().to_str()
                && is_recovery_file_name(file_name)
            {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

fn is_recovery_file_name(name: &str) -> bool {
    name.starts_with(FILE_PREFIX) && name.ends_with(FILE_EXTENSION)
}

async fn read_recovery_file(path: &Path) -> Result<Vec<LogEntry>, String> {
    let data = fs::read(path).await.map_err(|e| format!("read failed: {e}"))?;
    let file: RecoveryFile =
        serde_json::from_slice(&data).map_err(|e| format!("parse failed: {e}"))?;
    if file.entry_count != file.entries.len() {
        return Err(format!(
            "entry count mismatch: header says {}, found {}",
            file.entry_count,
            file.entries.len()
        ));
    }
    Ok(file.entries)
}
