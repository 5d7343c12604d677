pub mod backpressure;
pub mod error;
pub mod metrics;
pub mod queue;

pub use backpressure::{BackpressureLevel, OverflowPolicy};
pub use error::BufferError;
pub use metrics::BufferMetrics;
pub use queue::{AddOutcome, LogBuffer};
