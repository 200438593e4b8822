//! Request admission pipeline.
//!
//! Runs the per-request decision sequence: exempt-path check, threat
//! scan, bot classification, then tier-dependent rate limiting. All
//! services are owned here and passed by handle, so two gates on the
//! same process never share hidden state.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::GatehouseConfig;
use crate::error::Result;
use crate::limit::{RateCheck, RateLimiter};
use crate::request::RequestContext;
use crate::telemetry::{SecurityEvent, TelemetrySink, TelemetryStats};
use crate::threat::{self, Threat};
use crate::tier::{BotTier, Classification};
use crate::verify::{BotVerifier, IpRangeStats};

/// What to do with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// Admit the request
    Pass,
    /// Reject with 403
    Deny,
    /// Reject with 429
    Limit {
        /// Seconds until the client should retry
        retry_after: u64,
    },
}

/// Full outcome of the admission pipeline for one request.
#[derive(Debug, Clone)]
pub struct GateDecision {
    /// The action to take
    pub action: GateAction,
    /// Bot classification verdict
    pub classification: Classification,
    /// Rate-limit check outcome, when one ran
    pub rate: Option<RateCheck>,
    /// Threat signature match, advisory only
    pub threat: Option<Threat>,
    /// The limit applied, when one was looked up
    pub limit: Option<u32>,
    /// Whether the path was exempt from the pipeline
    pub exempt: bool,
}

/// Aggregated operational counters for the stats surface.
#[derive(Debug, Clone, Serialize)]
pub struct GateStats {
    pub dns_cache_entries: u64,
    pub ip_ranges: IpRangeStats,
    pub rate_limited_keys: usize,
    pub distributed_limiting: bool,
    pub telemetry: TelemetryStats,
}

/// The admission pipeline and its services.
pub struct Gate {
    config: GatehouseConfig,
    verifier: BotVerifier,
    limiter: RateLimiter,
    sink: TelemetrySink,
}

impl Gate {
    /// Build a gate from configuration, with the system DNS resolver.
    pub fn new(config: GatehouseConfig) -> Result<Self> {
        let verifier = BotVerifier::new();
        for (bot, ranges) in &config.gate.ip_ranges {
            let added = verifier.ip_verifier().add_ranges(bot, ranges);
            if added > 0 {
                info!(bot, ranges = added, "Loaded extra IP ranges from config");
            }
        }

        let limiter = RateLimiter::new(&config.rate_limit)?;
        let sink = TelemetrySink::new(&config.telemetry)?;

        Ok(Self {
            config,
            verifier,
            limiter,
            sink,
        })
    }

    /// Build a gate from preconstructed services.
    pub fn with_parts(
        config: GatehouseConfig,
        verifier: BotVerifier,
        limiter: RateLimiter,
        sink: TelemetrySink,
    ) -> Self {
        Self {
            config,
            verifier,
            limiter,
            sink,
        }
    }

    pub fn config(&self) -> &GatehouseConfig {
        &self.config
    }

    pub fn verifier(&self) -> &BotVerifier {
        &self.verifier
    }

    pub fn sink(&self) -> &TelemetrySink {
        &self.sink
    }

    /// Decide what to do with a request.
    pub async fn inspect(&self, ctx: &RequestContext) -> GateDecision {
        if self.is_exempt(&ctx.path) {
            return GateDecision {
                action: GateAction::Pass,
                classification: Classification::anonymous(),
                rate: None,
                threat: None,
                limit: None,
                exempt: true,
            };
        }

        let threat = threat::detect(&ctx.path, &ctx.query, ctx.user_agent(), &ctx.method);
        if let Some(threat) = &threat {
            warn!(
                ip = %ctx.client_ip,
                kind = threat.kind,
                matched = %threat.matched,
                path = %ctx.path,
                "Threat signature matched"
            );
        }

        let classification = self.verifier.verify(ctx.user_agent(), ctx.client_ip).await;

        if classification.tier == BotTier::Blocked {
            return GateDecision {
                action: GateAction::Deny,
                classification,
                rate: None,
                threat,
                limit: None,
                exempt: false,
            };
        }

        if classification.tier.bypasses_rate_limit() {
            debug!(
                ip = %ctx.client_ip,
                tier = classification.tier.as_str(),
                "Verified crawler bypasses rate limit"
            );
            return GateDecision {
                action: GateAction::Pass,
                classification,
                rate: None,
                threat,
                limit: None,
                exempt: false,
            };
        }

        let limit = self.config.rate_limit.limit_for(classification.tier);
        let key = format!("{}:{}", ctx.client_ip, classification.tier.as_str());
        let rate = self.limiter.check(&key, limit).await;

        if !rate.allowed {
            info!(
                ip = %ctx.client_ip,
                tier = classification.tier.as_str(),
                limit,
                "Rate limit exceeded"
            );
            return GateDecision {
                action: GateAction::Limit {
                    retry_after: rate.reset_secs,
                },
                classification,
                rate: Some(rate),
                threat,
                limit: Some(limit),
                exempt: false,
            };
        }

        GateDecision {
            action: GateAction::Pass,
            classification,
            rate: Some(rate),
            threat,
            limit: Some(limit),
            exempt: false,
        }
    }

    /// Hand the finished request to telemetry, subject to the selective
    /// logging policy.
    pub async fn record(
        &self,
        ctx: &RequestContext,
        decision: &GateDecision,
        status: u16,
        duration: Duration,
    ) {
        if !self.sink.enabled() {
            return;
        }

        let mut event = SecurityEvent::from_request(&self.config.site_name, ctx, status, duration);
        if let Some(threat) = &decision.threat {
            event.threat_type = Some(threat.kind.to_string());
            event.threat_details = Some(threat.matched.clone());
        }
        if !decision.exempt {
            event.bot_tier = Some(decision.classification.tier.as_str().to_string());
        }
        event.rate_limited = matches!(decision.action, GateAction::Limit { .. });

        if self.sink.should_record(&event) {
            self.sink.record(event).await;
        }
    }

    /// Operational counters across all services.
    pub async fn stats(&self) -> GateStats {
        GateStats {
            dns_cache_entries: self.verifier.dns_verifier().cache_entries(),
            ip_ranges: self.verifier.ip_verifier().stats(),
            rate_limited_keys: self.limiter.tracked_keys(),
            distributed_limiting: self.limiter.distributed(),
            telemetry: self.sink.stats().await,
        }
    }

    fn is_exempt(&self, path: &str) -> bool {
        self.config
            .gate
            .exempt_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}
