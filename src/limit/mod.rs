//! Tiered rate limiting.
//!
//! A distributed fixed-window counter (Cloudflare KV) when a store token
//! is configured, with an in-memory sliding window behind it. Fallback
//! is per request: any store failure downgrades that one check to local
//! state rather than surfacing an error.

pub mod kv;
pub mod local;

pub use kv::KvLimiter;
pub use local::LocalLimiter;

use crate::config::RateLimitConfig;
use crate::error::Result;
use std::time::Duration;
use tracing::debug;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCheck {
    /// Whether the request is admitted
    pub allowed: bool,
    /// Requests left in the window after this one
    pub remaining: u32,
    /// Seconds until the window frees capacity
    pub reset_secs: u64,
}

/// Rate limiter facade over the two strategies.
///
/// Both strategies honor the same check contract, so callers never know
/// which one answered.
pub struct RateLimiter {
    kv: Option<KvLimiter>,
    local: LocalLimiter,
}

impl RateLimiter {
    /// Build from config. The distributed strategy is enabled only when
    /// an API token is present.
    pub fn new(config: &RateLimitConfig) -> Result<Self> {
        let window = Duration::from_secs(config.window_seconds);
        let kv = if config.kv.api_token.is_empty() {
            None
        } else {
            Some(KvLimiter::new(&config.kv, window)?)
        };
        Ok(Self {
            kv,
            local: LocalLimiter::new(window),
        })
    }

    /// A limiter with no distributed store.
    pub fn local_only(window: Duration) -> Self {
        Self {
            kv: None,
            local: LocalLimiter::new(window),
        }
    }

    /// Check and count a request under `key`.
    pub async fn check(&self, key: &str, limit: u32) -> RateCheck {
        if let Some(kv) = &self.kv {
            if let Some(check) = kv.check(key, limit).await {
                return check;
            }
            debug!(key, "KV store unavailable, using local fallback");
        }
        self.local.check(key, limit)
    }

    /// Whether the distributed strategy is configured.
    pub fn distributed(&self) -> bool {
        self.kv.is_some()
    }

    /// Number of keys in the local fallback map.
    pub fn tracked_keys(&self) -> usize {
        self.local.tracked_keys()
    }

    /// Drop all local state.
    pub fn reset_local(&self) {
        self.local.reset();
    }
}
