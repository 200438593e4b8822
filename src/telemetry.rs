//! Best-effort security telemetry.
//!
//! Events are buffered in memory and shipped in NDJSON batches to an
//! Axiom-compatible ingest endpoint. Shipping runs on a detached task and
//! never blocks or fails a request; a failed batch is re-queued at the
//! head of the buffer, which is capped so repeated failures stay bounded.

use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::request::RequestContext;

/// Ingest request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Free-text fields are clipped to this many characters
const MAX_FIELD_LEN: usize = 500;

/// One security event, serialized as a single NDJSON line.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    /// Event time, RFC 3339 UTC
    pub timestamp: String,
    /// Site name from configuration
    pub site: String,
    /// Resolved client IP
    pub ip: String,
    /// Edge country code, "Unknown" when absent
    pub country: String,
    /// User agent, "Unknown" when absent
    pub user_agent: String,
    /// HTTP method
    pub method: String,
    /// Request path
    pub path: String,
    /// Query string, omitted when empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Response status code
    pub status: u16,
    /// Request duration in milliseconds, two decimals
    pub duration_ms: f64,
    /// Request id (CF-Ray or "local")
    pub ray_id: String,
    /// Threat category when a signature matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_type: Option<String>,
    /// The matched threat text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threat_details: Option<String>,
    /// Whether the request was rejected by the rate limiter
    pub rate_limited: bool,
    /// Classified bot tier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_tier: Option<String>,
    /// Referer header, omitted when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
}

impl SecurityEvent {
    /// Build the base event from a request. Threat, tier, and rate-limit
    /// fields start empty and are filled in by the caller.
    pub fn from_request(
        site: &str,
        ctx: &RequestContext,
        status: u16,
        duration: Duration,
    ) -> Self {
        let duration_ms = duration.as_secs_f64() * 1000.0;
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            site: site.to_string(),
            ip: ctx.client_ip.to_string(),
            country: ctx.country().unwrap_or("Unknown").to_string(),
            user_agent: clip(ctx.user_agent().unwrap_or("Unknown")),
            method: ctx.method.clone(),
            path: ctx.path.clone(),
            query: (!ctx.query.is_empty()).then(|| clip(&ctx.query)),
            status,
            duration_ms: (duration_ms * 100.0).round() / 100.0,
            ray_id: ctx.ray_id.clone(),
            threat_type: None,
            threat_details: None,
            rate_limited: false,
            bot_tier: None,
            referer: ctx.referer().map(clip),
        }
    }
}

fn clip(value: &str) -> String {
    value.chars().take(MAX_FIELD_LEN).collect()
}

/// Sent/failed counters plus current buffer depth.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TelemetryStats {
    pub events_sent: u64,
    pub events_failed: u64,
    pub buffered: usize,
}

/// Buffering telemetry shipper. Cheap to clone, shares one buffer.
#[derive(Clone)]
pub struct TelemetrySink {
    inner: Arc<SinkInner>,
}

struct SinkInner {
    client: Client,
    ingest_url: String,
    token: String,
    log_all: bool,
    batch_size: usize,
    flush_interval: Duration,
    max_buffer: usize,
    buffer: Mutex<Vec<SecurityEvent>>,
    last_flush: Mutex<Instant>,
    events_sent: AtomicU64,
    events_failed: AtomicU64,
}

impl TelemetrySink {
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let ingest_url = format!(
            "{}/v1/datasets/{}/ingest",
            config.endpoint.trim_end_matches('/'),
            config.dataset
        );

        Ok(Self {
            inner: Arc::new(SinkInner {
                client,
                ingest_url,
                token: config.token.clone(),
                log_all: config.log_all,
                batch_size: config.batch_size,
                flush_interval: Duration::from_secs(config.flush_interval_seconds),
                max_buffer: config.batch_size * 10,
                buffer: Mutex::new(Vec::new()),
                last_flush: Mutex::new(Instant::now()),
                events_sent: AtomicU64::new(0),
                events_failed: AtomicU64::new(0),
            }),
        })
    }

    /// Whether an ingest token is configured. Without one the sink
    /// silently drops everything.
    pub fn enabled(&self) -> bool {
        !self.inner.token.is_empty()
    }

    /// Selective logging policy: everything when `log_all`, otherwise only
    /// threats, rate-limited requests, and error responses.
    pub fn should_record(&self, event: &SecurityEvent) -> bool {
        self.inner.log_all
            || event.threat_type.is_some()
            || event.rate_limited
            || event.status >= 400
    }

    /// Buffer an event, spawning a background flush when the batch is full
    /// or the flush interval has elapsed.
    pub async fn record(&self, event: SecurityEvent) {
        if !self.enabled() {
            return;
        }

        let buffered = {
            let mut buffer = self.inner.buffer.lock().await;
            buffer.push(event);
            if buffer.len() > self.inner.max_buffer {
                let overflow = buffer.len() - self.inner.max_buffer;
                buffer.drain(..overflow);
            }
            buffer.len()
        };

        let interval_elapsed =
            self.inner.last_flush.lock().await.elapsed() >= self.inner.flush_interval;

        if buffered >= self.inner.batch_size || interval_elapsed {
            let sink = self.clone();
            tokio::spawn(async move { sink.flush().await });
        }
    }

    /// Ship one batch from the front of the buffer. On failure the batch
    /// goes back to the head so ordering survives a retry.
    pub async fn flush(&self) {
        let batch: Vec<SecurityEvent> = {
            let mut buffer = self.inner.buffer.lock().await;
            if buffer.is_empty() {
                return;
            }
            let take = buffer.len().min(self.inner.batch_size);
            buffer.drain(..take).collect()
        };

        *self.inner.last_flush.lock().await = Instant::now();

        match self.send(&batch).await {
            Ok(()) => {
                self.inner
                    .events_sent
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                debug!(events = batch.len(), "Telemetry batch shipped");
            }
            Err(err) => {
                self.inner
                    .events_failed
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                warn!(
                    error = %err,
                    events = batch.len(),
                    "Telemetry batch failed, re-queueing"
                );
                let mut buffer = self.inner.buffer.lock().await;
                for event in batch.into_iter().rev() {
                    buffer.insert(0, event);
                }
                if buffer.len() > self.inner.max_buffer {
                    let overflow = buffer.len() - self.inner.max_buffer;
                    buffer.drain(..overflow);
                }
            }
        }
    }

    async fn send(&self, batch: &[SecurityEvent]) -> std::result::Result<(), String> {
        let mut body = String::new();
        for event in batch {
            let line = serde_json::to_string(event).map_err(|err| format!("serialize: {err}"))?;
            body.push_str(&line);
            body.push('\n');
        }

        let response = self
            .inner
            .client
            .post(&self.inner.ingest_url)
            .bearer_auth(&self.inner.token)
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("ingest returned {}", response.status()))
        }
    }

    pub fn events_sent(&self) -> u64 {
        self.inner.events_sent.load(Ordering::Relaxed)
    }

    pub fn events_failed(&self) -> u64 {
        self.inner.events_failed.load(Ordering::Relaxed)
    }

    pub async fn buffered(&self) -> usize {
        self.inner.buffer.lock().await.len()
    }

    pub async fn stats(&self) -> TelemetryStats {
        TelemetryStats {
            events_sent: self.events_sent(),
            events_failed: self.events_failed(),
            buffered: self.buffered().await,
        }
    }
}
