//! Configuration types for the gatehouse service.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{GatehouseError, Result};
use crate::tier::BotTier;

/// Main configuration for the gatehouse service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatehouseConfig {
    /// Site label attached to telemetry events
    pub site_name: String,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Admission pipeline settings
    pub gate: GateConfig,

    /// Rate limiting settings
    pub rate_limit: RateLimitConfig,

    /// Telemetry shipping settings
    pub telemetry: TelemetryConfig,
}

impl Default for GatehouseConfig {
    fn default() -> Self {
        Self {
            site_name: "gatehouse".to_string(),
            server: ServerConfig::default(),
            gate: GateConfig::default(),
            rate_limit: RateLimitConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl GatehouseConfig {
    /// Load configuration from a YAML or JSON file, selected by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let display = path.display().to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match extension {
            "yaml" | "yml" => {
                serde_yaml::from_str(&content).map_err(|err| GatehouseError::ConfigParse {
                    path: display,
                    message: err.to_string(),
                })
            }
            "json" => {
                serde_json::from_str(&content).map_err(|err| GatehouseError::ConfigParse {
                    path: display,
                    message: err.to_string(),
                })
            }
            other => Err(GatehouseError::ConfigFormat(other.to_string())),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Admission pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Path prefixes that skip classification and rate limiting
    pub exempt_paths: Vec<String>,

    /// Extra published IP ranges per bot name (CIDR notation), merged
    /// into the built-in tables at startup
    pub ip_ranges: HashMap<String, Vec<String>>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            exempt_paths: vec!["/health".to_string(), "/static".to_string()],
            ip_ranges: HashMap::new(),
        }
    }
}

/// Rate limiting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Window length in seconds
    pub window_seconds: u64,

    /// Requests per window for anonymous traffic
    pub anonymous_per_minute: u32,

    /// Requests per window for allow-listed bots
    pub allowed_per_minute: u32,

    /// Requests per window for failed verification claims
    pub unverified_per_minute: u32,

    /// Distributed counter store settings
    pub kv: KvConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_seconds: 60,
            anonymous_per_minute: 30,
            allowed_per_minute: 1000,
            unverified_per_minute: 10,
            kv: KvConfig::default(),
        }
    }
}

impl RateLimitConfig {
    /// Requests per window for a tier. Verified tiers bypass the limiter
    /// and never reach this lookup.
    pub fn limit_for(&self, tier: BotTier) -> u32 {
        match tier {
            BotTier::Allowed => self.allowed_per_minute,
            BotTier::UnverifiedClaim => self.unverified_per_minute,
            _ => self.anonymous_per_minute,
        }
    }
}

/// Cloudflare Workers KV settings for distributed counters.
///
/// The distributed strategy stays disabled while `api_token` is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KvConfig {
    /// Cloudflare account id
    pub account_id: String,

    /// KV namespace id
    pub namespace_id: String,

    /// API token with KV write access
    pub api_token: String,

    /// API base URL
    pub api_base: String,

    /// Site namespace for counter keys
    pub site_name: String,

    /// Key prefix for counter keys
    pub prefix: String,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            namespace_id: String::new(),
            api_token: String::new(),
            api_base: "https://api.cloudflare.com/client/v4".to_string(),
            site_name: "gatehouse".to_string(),
            prefix: "rate".to_string(),
        }
    }
}

/// Telemetry shipping settings.
///
/// The sink stays disabled while `token` is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Ingest endpoint base URL
    pub endpoint: String,

    /// Dataset name
    pub dataset: String,

    /// Ingest API token
    pub token: String,

    /// Events per shipped batch
    pub batch_size: usize,

    /// Maximum seconds between flushes
    pub flush_interval_seconds: u64,

    /// Record every request instead of only threats, limited requests,
    /// and error responses
    pub log_all: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.axiom.co".to_string(),
            dataset: "gatehouse".to_string(),
            token: String::new(),
            batch_size: 100,
            flush_interval_seconds: 10,
            log_all: false,
        }
    }
}
