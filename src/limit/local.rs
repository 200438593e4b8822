//! In-memory sliding-window rate limiter.
//!
//! Tracks request timestamps per key and prunes them against a moving
//! window on every check. A global sweep of idle keys runs at most once
//! per window, gated by an atomic timestamp.

use super::RateCheck;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Sliding-window limiter over per-key timestamp lists.
pub struct LocalLimiter {
    /// Window length
    window: Duration,
    /// Request timestamps per key
    requests: DashMap<String, Vec<Instant>>,
    /// Epoch seconds of the last global sweep
    last_sweep: AtomicU64,
}

impl LocalLimiter {
    /// Create a limiter with the given window.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            requests: DashMap::new(),
            last_sweep: AtomicU64::new(epoch_secs()),
        }
    }

    /// Check and record a request under `key`.
    ///
    /// When denied, `reset_secs` is the time until the oldest request in
    /// the window falls out, so a retry at that point can succeed.
    pub fn check(&self, key: &str, limit: u32) -> RateCheck {
        self.maybe_sweep();

        let now = Instant::now();
        let mut entry = self.requests.entry(key.to_string()).or_default();
        entry.retain(|t| now.duration_since(*t) < self.window);

        let current = entry.len() as u32;
        if current >= limit {
            let oldest = entry.iter().min().copied().unwrap_or(now);
            let reset_secs = self
                .window
                .saturating_sub(now.duration_since(oldest))
                .as_secs()
                + 1;
            return RateCheck {
                allowed: false,
                remaining: 0,
                reset_secs,
            };
        }

        entry.push(now);
        RateCheck {
            allowed: true,
            remaining: limit - current - 1,
            reset_secs: self.window.as_secs(),
        }
    }

    /// Drop idle keys, at most once per window.
    fn maybe_sweep(&self) {
        let now_secs = epoch_secs();
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now_secs.saturating_sub(last) < self.window.as_secs() {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now_secs, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            let now = Instant::now();
            self.requests.retain(|_, times| {
                times.retain(|t| now.duration_since(*t) < self.window);
                !times.is_empty()
            });
        }
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.requests.len()
    }

    /// Drop all tracked state.
    pub fn reset(&self) {
        self.requests.clear();
    }
}

impl Default for LocalLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
