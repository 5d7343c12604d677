//! Per-key request budget.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Windows are swept once the map grows past this many keys.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window limiter keyed by API key hash.
///
/// Each key gets `limit` requests per window; the window restarts on the
/// first request after it expires. A limit of zero means unlimited.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// One-minute windows, matching `rate_limit` being requests per minute.
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Counts one request against `key`. Returns `false` when the budget for
    /// the current window is spent.
    pub fn try_acquire(&self, key: &str, limit: u32) -> bool {
        if limit == 0 {
            return true;
        }

        let now = Instant::now();
        let mut windows = self.windows.lock();

        if windows.len() > SWEEP_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count < limit {
            entry.count += 1;
            true
        } else {
            tracing::debug!(limit, "Rate limit reached");
            false
        }
    }

    /// Requests already counted in the key's current window.
    pub fn current_count(&self, key: &str) -> u32 {
        let windows = self.windows.lock();
        windows
            .get(key)
            .filter(|w| w.started.elapsed() < self.window)
            .map_or(0, |w| w.count)
    }

    pub fn reset(&self, key: &str) {
        self.windows.lock().remove(key);
    }
}
