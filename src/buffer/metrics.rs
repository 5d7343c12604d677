use serde::Serialize;

/// Point-in-time view of buffer counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferMetrics {
    pub capacity: usize,
    pub len: usize,
    pub added: u64,
    pub evicted: u64,
    pub rejected: u64,
    pub flushed: u64,
    pub peak_size: usize,
}

impl BufferMetrics {
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.len as f64 / self.capacity as f64
    }
}
