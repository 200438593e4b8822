//! Request classification and adaptive rate limiting for HTTP services
//!
//! Classifies every request into a bot trust tier and applies
//! tier-dependent rate limits, so verified crawlers pass freely while
//! spoofed ones get throttled hardest.
//!
//! # Features
//!
//! - Search crawler verification via forward-confirmed reverse DNS
//! - AI crawler verification against published IP ranges
//! - Sliding-window rate limiting with an optional distributed KV store
//! - Threat signature scanning (injection, probes, scanner tooling)
//! - Best-effort batched security telemetry
//! - Hardened security headers on every response
//!
//! # Example
//!
//! ```ignore
//! use gatehouse::{Gate, GatehouseConfig};
//! use std::sync::Arc;
//!
//! let config = GatehouseConfig::load("gatehouse.yaml")?;
//! let gate = Arc::new(Gate::new(config)?);
//!
//! let decision = gate.inspect(&ctx).await;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod gate;
pub mod limit;
pub mod middleware;
pub mod request;
pub mod telemetry;
pub mod threat;
pub mod tier;
pub mod verify;

pub use config::GatehouseConfig;
pub use error::{GatehouseError, Result};
pub use gate::{Gate, GateAction, GateDecision, GateStats};
pub use request::RequestContext;
pub use tier::{BotTier, Classification, VerificationMethod};
pub use verify::BotVerifier;
