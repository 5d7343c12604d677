use serde::{Deserialize, Serialize};

/// What `LogBuffer::add` does when the buffer is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest buffered entry to make room. Evictions are metered.
    #[default]
    DropOldest,
    /// Refuse the new entry so the caller can push back upstream.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressureLevel {
    None,
    Low,
    Medium,
    High,
}

impl BackpressureLevel {
    pub fn from_fill_ratio(ratio: f64) -> Self {
        if ratio < 0.5 {
            BackpressureLevel::None
        } else if ratio < 0.8 {
            BackpressureLevel::Low
        } else if ratio < 0.95 {
            BackpressureLevel::Medium
        } else {
            BackpressureLevel::High
        }
    }
}
