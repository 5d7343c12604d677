// RetentionScheduler: runs RetentionEngine::run_cleanup on the policy interval.
// The interval is re-read before every sleep so a hot-reloaded policy takes
// effect from the next cycle.

use super::engine::{CleanupResult, RetentionEngine};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct RetentionScheduler {
    engine: Arc<RetentionEngine>,
    parent: CancellationToken,
    running: Mutex<Option<Running>>,
}

impl RetentionScheduler {
    /// `parent` cancels the scheduler together with the rest of the process.
    pub fn new(engine: Arc<RetentionEngine>, parent: CancellationToken) -> Self {
        Self {
            engine,
            parent,
            running: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<RetentionEngine> {
        &self.engine
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Spawns the cleanup loop. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let cancel = self.parent.child_token();
        let engine = self.engine.clone();
        let handle = tokio::spawn(run(engine, cancel.clone()));
        *running = Some(Running { cancel, handle });
        true
    }

    /// Stops the loop and waits for it to exit. A no-op if not running.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            error!("Retention scheduler task failed: {e}");
        }
    }
}

async fn run(engine: Arc<RetentionEngine>, cancel: CancellationToken) {
    info!(
        "Retention scheduler started, interval {:?}",
        engine.policy().interval
    );

    loop {
        let interval = engine.policy().interval;
        tokio::select! {
            () = cancel.cancelled() => {
                info!("Retention scheduler received shutdown signal, stopping");
                break;
            }
            () = sleep(interval) => {}
        }

        // Deletes are per batch, so abandoning a pass part way is safe.
        tokio::select! {
            () = cancel.cancelled() => {
                warn!("Retention scheduler cancelled during cleanup, stopping");
                break;
            }
            result = engine.run_cleanup() => report(&result),
        }
    }

    info!("Retention scheduler shutdown complete");
}

fn report(result: &CleanupResult) {
    let elapsed = result.finished_at - result.started_at;
    if result.is_clean() {
        info!(
            deleted = result.total_deleted,
            elapsed_ms = elapsed.num_milliseconds(),
            "Retention cleanup completed"
        );
    } else {
        warn!(
            deleted = result.total_deleted,
            errors = result.errors.len(),
            elapsed_ms = elapsed.num_milliseconds(),
            "Retention cleanup completed with errors"
        );
    }
}
