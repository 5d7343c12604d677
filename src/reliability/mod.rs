pub mod health;
pub mod recovery;

pub use health::{
    ComponentHealth, HealthConfig, HealthMonitor, HealthReport, HealthStatus,
    spawn_storage_health_checks,
};
pub use recovery::{RecoveryError, RecoveryManager, RecoveryOutcome, RecoveryStats, SkippedFile};
