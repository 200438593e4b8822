//! Distributed rate-limit counters in Cloudflare Workers KV.
//!
//! Counters are keyed per fixed window and expire via the store's TTL.
//! Every operation makes exactly one attempt with a short timeout; any
//! failure is reported to the caller, which falls back to local state.
//! The read-then-write increment can undercount under concurrency,
//! which is acceptable for admission control.

use super::RateCheck;
use crate::config::KvConfig;
use crate::error::Result;
use reqwest::StatusCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// TTL slack beyond the window so a counter never expires mid-window.
const TTL_BUFFER_SECS: u64 = 10;

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// KV-backed fixed-window counter client.
pub struct KvLimiter {
    client: reqwest::Client,
    values_url: String,
    token: String,
    site: String,
    prefix: String,
    window: Duration,
}

impl KvLimiter {
    /// Build a client from config. The caller decides whether a token is
    /// present; this constructor only fails on HTTP client construction.
    pub fn new(config: &KvConfig, window: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let values_url = format!(
            "{}/accounts/{}/storage/kv/namespaces/{}/values",
            config.api_base.trim_end_matches('/'),
            config.account_id,
            config.namespace_id
        );
        Ok(Self {
            client,
            values_url,
            token: config.api_token.clone(),
            site: config.site_name.clone(),
            prefix: config.prefix.clone(),
            window,
        })
    }

    fn window_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }

    /// Storage key for `key` in the current window.
    fn window_key(&self, key: &str) -> String {
        let window = epoch_secs() / self.window_secs();
        format!("{}:{}:{}:{}", self.prefix, self.site, key, window)
    }

    /// Seconds until the current window index rolls over.
    fn secs_until_rollover(&self) -> u64 {
        let window = self.window_secs();
        window - (epoch_secs() % window)
    }

    /// Read a counter. `None` means the store could not answer.
    async fn get_count(&self, storage_key: &str) -> Option<u64> {
        let url = format!("{}/{}", self.values_url, storage_key);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status() == StatusCode::OK => {
                resp.text().await.ok().and_then(|t| t.trim().parse().ok())
            }
            Ok(resp) if resp.status() == StatusCode::NOT_FOUND => Some(0),
            Ok(resp) => {
                debug!(status = %resp.status(), "KV read returned unexpected status");
                None
            }
            Err(err) => {
                debug!(error = %err, "KV read failed");
                None
            }
        }
    }

    /// Write a counter with the window TTL. Returns false on any failure.
    async fn put_count(&self, storage_key: &str, value: u64) -> bool {
        let url = format!("{}/{}", self.values_url, storage_key);
        let ttl = self.window_secs() + TTL_BUFFER_SECS;
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.token)
            .header("Content-Type", "text/plain")
            .query(&[("expiration_ttl", ttl)])
            .body(value.to_string())
            .send()
            .await;

        match response {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(err) => {
                debug!(error = %err, "KV write failed");
                false
            }
        }
    }

    /// Check and count a request under `key` in the distributed store.
    ///
    /// Returns `None` when the store could not be consulted, so the
    /// caller can fall back to local limiting for this request.
    pub async fn check(&self, key: &str, limit: u32) -> Option<RateCheck> {
        let storage_key = self.window_key(key);

        let count = self.get_count(&storage_key).await?;
        if count >= u64::from(limit) {
            return Some(RateCheck {
                allowed: false,
                remaining: 0,
                reset_secs: self.secs_until_rollover(),
            });
        }

        if !self.put_count(&storage_key, count + 1).await {
            return None;
        }

        Some(RateCheck {
            allowed: true,
            remaining: limit - count as u32 - 1,
            reset_secs: self.secs_until_rollover(),
        })
    }
}
