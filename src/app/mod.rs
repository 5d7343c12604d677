pub mod config;
pub mod keys;
pub mod logging;
pub mod pipeline;
pub mod shutdown;

pub use config::{Config, ConfigError};
pub use pipeline::{FlushOutcome, IngestPipeline, IngestReceipt, PipelineComponents, PipelineStats};

use crate::auth::{ApiKeyAuthority, RateLimiter};
use crate::buffer::LogBuffer;
use crate::domain::IngestError;
use crate::protection::{DataProtectionConfig, DataProtector};
use crate::reliability::{HealthConfig, HealthMonitor, HealthReport, RecoveryManager};
use crate::retention::{RetentionEngine, RetentionPolicy, RetentionScheduler};
use crate::storage::LogStore;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A running ingestion core: pipeline plus its background loops.
pub struct App {
    config: Config,
    pipeline: Arc<IngestPipeline>,
    authority: Arc<ApiKeyAuthority>,
    protector: Arc<DataProtector>,
    recovery: Option<Arc<RecoveryManager>>,
    retention: Option<RetentionScheduler>,
    health: Arc<HealthMonitor>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    started_at: Instant,
}

impl App {
    /// Builds every component from `config`, replays recovery files into the
    /// buffer and starts the background loops.
    pub async fn start(config: Config, store: Arc<dyn LogStore>) -> Result<Self, IngestError> {
        config.validate()?;
        info!("Starting rask-log-ingest {}", crate::VERSION);

        let authority = match &config.auth.keys_file {
            Some(path) => ApiKeyAuthority::load(path)?,
            None => ApiKeyAuthority::new(config.auth.require_auth),
        };
        authority.set_require_auth(config.auth.require_auth);
        if !config.auth.require_auth {
            warn!("API key authentication is disabled; every caller is treated as admin");
        }
        let authority = Arc::new(authority);

        let protector = Arc::new(DataProtector::new(config.protection.clone())?);
        let buffer = Arc::new(LogBuffer::new(
            config.buffer.capacity,
            config.buffer.overflow_policy,
        )?);
        let recovery = config
            .recovery
            .enabled
            .then(|| Arc::new(RecoveryManager::new(config.recovery.directory.clone())));

        let pipeline = Arc::new(IngestPipeline::new(PipelineComponents {
            buffer,
            store: Arc::clone(&store),
            recovery: recovery.clone(),
            authority: Arc::clone(&authority),
            protector: Arc::clone(&protector),
            rate_limiter: RateLimiter::new(),
            flush_timeout: config.buffer.flush_timeout,
        }));

        let cancel = CancellationToken::new();
        pipeline.replay_recovered(&cancel).await?;

        let mut tasks = vec![pipeline.spawn_flush_loop(config.buffer.flush_interval, cancel.clone())];

        if let Some(recovery) = &recovery {
            tasks.push(Arc::clone(recovery).spawn_cleanup_loop(
                config.recovery.cleanup_interval,
                config.recovery.max_file_age,
                cancel.clone(),
            ));
        }

        let health = Arc::new(HealthMonitor::new(HealthConfig::from(&config.health)));
        tasks.push(crate::reliability::spawn_storage_health_checks(
            Arc::clone(&health),
            Arc::clone(&store),
            cancel.clone(),
        ));

        let retention = if config.retention.enabled {
            let engine = Arc::new(RetentionEngine::new(
                Arc::clone(&store),
                config.retention.policy.clone(),
            )?);
            let scheduler = RetentionScheduler::new(engine, cancel.clone());
            scheduler.start();
            Some(scheduler)
        } else {
            info!("Retention disabled");
            None
        };

        info!(
            buffer_capacity = config.buffer.capacity,
            recovery = config.recovery.enabled,
            retention = config.retention.enabled,
            "rask-log-ingest started"
        );

        Ok(Self {
            config,
            pipeline,
            authority,
            protector,
            recovery,
            retention,
            health,
            cancel,
            tasks,
            started_at: Instant::now(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pipeline(&self) -> &Arc<IngestPipeline> {
        &self.pipeline
    }

    pub fn authority(&self) -> &Arc<ApiKeyAuthority> {
        &self.authority
    }

    pub fn protector(&self) -> &Arc<DataProtector> {
        &self.protector
    }

    pub fn recovery(&self) -> Option<&Arc<RecoveryManager>> {
        self.recovery.as_ref()
    }

    pub fn retention_engine(&self) -> Option<&Arc<RetentionEngine>> {
        self.retention.as_ref().map(RetentionScheduler::engine)
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub async fn health_report(&self) -> HealthReport {
        HealthReport::generate(&self.health, self.started_at).await
    }

    /// Hot-swaps the retention policy; the scheduler picks up a new interval
    /// on its next cycle.
    pub fn reload_retention_policy(&self, policy: RetentionPolicy) -> Result<(), IngestError> {
        match self.retention_engine() {
            Some(engine) => Ok(engine.update_policy(policy)?),
            None => {
                warn!("Retention is disabled, policy reload ignored");
                Ok(())
            }
        }
    }

    pub fn reload_protection(&self, config: DataProtectionConfig) -> Result<(), IngestError> {
        Ok(self.protector.update_config(config)?)
    }

    /// Graceful shutdown: stop accepting, final flush (routed to recovery on
    /// failure), stop retention, cancel and join the background loops.
    pub async fn shutdown(mut self) -> FlushOutcome {
        info!("Initiating graceful shutdown...");

        let outcome = self.pipeline.shutdown().await;

        if let Some(retention) = &self.retention {
            retention.stop().await;
        }
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Background task failed during shutdown: {e}");
            }
        }

        if let Err(e) = self.authority.save() {
            error!("Failed to save API keys on shutdown: {e}");
        }

        info!("Graceful shutdown completed");
        outcome
    }
}
