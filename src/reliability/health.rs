use crate::storage::LogStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const STORAGE_COMPONENT: &str = "storage";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentHealth {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub check_interval: Duration,
    pub unhealthy_threshold: u32,
    pub recovery_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            unhealthy_threshold: 3,
            recovery_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct ComponentState {
    health: ComponentHealth,
    consecutive_failures: u32,
    consecutive_successes: u32,
}

impl ComponentState {
    fn new() -> Self {
        Self {
            health: ComponentHealth::Healthy,
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }
}

/// Tracks the health of the ingest pipeline's collaborators.
///
/// A component turns unhealthy after `unhealthy_threshold` consecutive failed
/// checks and recovers after `recovery_threshold` consecutive successes.
pub struct HealthMonitor {
    config: HealthConfig,
    components: RwLock<HashMap<String, ComponentState>>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            components: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    pub async fn record_health_check(&self, component: &str, success: bool, detail: Option<&str>) {
        let mut components = self.components.write().await;
        let state = components
            .entry(component.to_string())
            .or_insert_with(ComponentState::new);

        if success {
            state.consecutive_successes += 1;
            state.consecutive_failures = 0;
        } else {
            state.consecutive_failures += 1;
            state.consecutive_successes = 0;
        }

        let new_health = if state.consecutive_failures >= self.config.unhealthy_threshold {
            ComponentHealth::Unhealthy(format!(
                "{} consecutive health check failures{}",
                state.consecutive_failures,
                detail.map(|d| format!(": {d}")).unwrap_or_default()
            ))
        } else if !success {
            ComponentHealth::Degraded(detail.unwrap_or("health check failed").to_string())
        } else if state.consecutive_successes >= self.config.recovery_threshold
            || state.health == ComponentHealth::Healthy
        {
            ComponentHealth::Healthy
        } else {
            state.health.clone()
        };

        if new_health != state.health {
            tracing::info!(
                component,
                from = ?state.health,
                to = ?new_health,
                "Component health changed"
            );
            state.health = new_health;
        }
    }

    pub async fn get_overall_health(&self) -> HealthStatus {
        let components = self.components.read().await;

        if components.is_empty() {
            return HealthStatus::Unhealthy;
        }

        let mut has_degraded = false;
        for state in components.values() {
            match &state.health {
                ComponentHealth::Unhealthy(_) => return HealthStatus::Unhealthy,
                ComponentHealth::Degraded(_) => has_degraded = true,
                ComponentHealth::Healthy => {}
            }
        }

        if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub async fn get_component_health(&self, component: &str) -> ComponentHealth {
        let components = self.components.read().await;
        components
            .get(component)
            .map(|state| state.health.clone())
            .unwrap_or(ComponentHealth::Unhealthy("Component not found".to_string()))
    }

    pub async fn get_all_component_status(&self) -> HashMap<String, ComponentHealth> {
        let components = self.components.read().await;
        components
            .iter()
            .map(|(name, state)| (name.clone(), state.health.clone()))
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub timestamp: String,
    pub uptime: Duration,
}

impl HealthReport {
    pub async fn generate(monitor: &HealthMonitor, start_time: Instant) -> Self {
        Self {
            overall_status: monitor.get_overall_health().await,
            components: monitor.get_all_component_status().await,
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime: start_time.elapsed(),
        }
    }
}

/// Probes `LogStore::health_check` every `check_interval` until `cancel` fires.
pub fn spawn_storage_health_checks(
    monitor: Arc<HealthMonitor>,
    store: Arc<dyn LogStore>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let period = monitor.config().check_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let health = store.health_check().await;
                    monitor
                        .record_health_check(STORAGE_COMPONENT, health.healthy, health.message.as_deref())
                        .await;
                }
            }
        }
        tracing::debug!("Storage health checks stopped");
    })
}
