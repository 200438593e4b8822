//! IP range verification for AI crawlers.
//!
//! Some AI crawlers publish their egress CIDR blocks (OpenAI's GPTBot,
//! Anthropic's ClaudeBot). A claimed identity is confirmed only when the
//! client IP falls inside a published block. Weaker than FCrDNS, but the
//! operators that offer no reverse DNS offer these lists instead.
//!
//! The table is mutable at runtime so range updates do not need a restart.

use dashmap::DashMap;
use ipnet::IpNet;
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{info, warn};

/// OpenAI GPTBot egress ranges, from https://openai.com/gptbot.json
const OPENAI_RANGES: &[&str] = &[
    "20.15.240.64/28",
    "20.15.240.80/28",
    "20.15.240.96/28",
    "20.15.240.176/28",
    "20.15.241.0/28",
    "20.15.242.128/28",
    "20.15.242.144/28",
    "20.15.242.192/28",
    "40.83.2.64/28",
    "52.230.152.0/24",
    "52.233.106.0/24",
];

/// Anthropic crawler ranges, from the published IP address list
const ANTHROPIC_RANGES: &[&str] = &["160.79.104.0/23"];

/// Result of an IP range check.
#[derive(Debug, Clone, PartialEq)]
pub struct IpVerification {
    /// Whether the IP fell inside a published range
    pub verified: bool,
    /// The matching network, when one was found
    pub matched_range: Option<String>,
    /// The claimed bot identity
    pub bot_name: String,
    /// Human-readable explanation
    pub detail: String,
}

/// Snapshot of the loaded range table.
#[derive(Debug, Clone, Serialize)]
pub struct IpRangeStats {
    pub bots_with_ranges: Vec<String>,
    pub total_ranges: usize,
    pub ranges_by_bot: HashMap<String, usize>,
}

/// Verifies client IPs against per-bot CIDR tables.
///
/// Supports both IPv4 and IPv6 networks. Pure in-memory computation,
/// no caching needed.
pub struct IpRangeVerifier {
    ranges: DashMap<String, Vec<IpNet>>,
}

impl IpRangeVerifier {
    /// Create a verifier preloaded with the known published ranges.
    pub fn new() -> Self {
        let verifier = Self {
            ranges: DashMap::new(),
        };
        verifier.ranges.insert(
            "openai".to_string(),
            Self::parse_ranges("openai", OPENAI_RANGES),
        );
        verifier.ranges.insert(
            "anthropic".to_string(),
            Self::parse_ranges("anthropic", ANTHROPIC_RANGES),
        );

        let loaded: Vec<String> = verifier
            .ranges
            .iter()
            .map(|entry| format!("{}={}", entry.key(), entry.value().len()))
            .collect();
        info!(ranges = %loaded.join(", "), "Loaded IP ranges");

        verifier
    }

    /// Create a verifier with no preloaded ranges.
    pub fn empty() -> Self {
        Self {
            ranges: DashMap::new(),
        }
    }

    fn parse_ranges<S: AsRef<str>>(bot_name: &str, cidrs: &[S]) -> Vec<IpNet> {
        cidrs
            .iter()
            .filter_map(|cidr| match cidr.as_ref().parse::<IpNet>() {
                Ok(net) => Some(net.trunc()),
                Err(err) => {
                    warn!(bot = bot_name, cidr = cidr.as_ref(), error = %err, "Invalid CIDR skipped");
                    None
                }
            })
            .collect()
    }

    /// Add ranges for a bot, returning the number of valid ranges added.
    ///
    /// Invalid CIDR strings are skipped with a warning.
    pub fn add_ranges<S: AsRef<str>>(&self, bot_name: &str, cidrs: &[S]) -> usize {
        let networks = Self::parse_ranges(bot_name, cidrs);
        let added = networks.len();
        self.ranges
            .entry(bot_name.to_string())
            .or_default()
            .extend(networks);
        info!(bot = bot_name, added, "Added IP ranges");
        added
    }

    /// Clear ranges for one bot, or for all bots when `None`.
    pub fn clear_ranges(&self, bot_name: Option<&str>) {
        match bot_name {
            Some(name) => {
                self.ranges.remove(name);
            }
            None => self.ranges.clear(),
        }
    }

    /// Verify an already-parsed client IP against a bot's ranges.
    pub fn verify_addr(&self, ip: IpAddr, bot_name: &str) -> IpVerification {
        let Some(ranges) = self.ranges.get(bot_name) else {
            return IpVerification {
                verified: false,
                matched_range: None,
                bot_name: bot_name.to_string(),
                detail: format!("No IP ranges registered for {bot_name}"),
            };
        };

        if ranges.is_empty() {
            return IpVerification {
                verified: false,
                matched_range: None,
                bot_name: bot_name.to_string(),
                detail: format!("Empty IP range list for {bot_name}"),
            };
        }

        for network in ranges.iter() {
            if network.contains(&ip) {
                return IpVerification {
                    verified: true,
                    matched_range: Some(network.to_string()),
                    bot_name: bot_name.to_string(),
                    detail: format!("IP {ip} verified in {network}"),
                };
            }
        }

        IpVerification {
            verified: false,
            matched_range: None,
            bot_name: bot_name.to_string(),
            detail: format!("IP {ip} not in any {bot_name} range"),
        }
    }

    /// Verify a textual IP against a bot's ranges.
    ///
    /// Missing-range outcomes take precedence over a malformed address,
    /// so an unknown bot reports its missing table either way.
    pub fn verify(&self, ip_address: &str, bot_name: &str) -> IpVerification {
        match ip_address.parse::<IpAddr>() {
            Ok(ip) => self.verify_addr(ip, bot_name),
            Err(_) => {
                let state = self.ranges.get(bot_name);
                let detail = match &state {
                    None => format!("No IP ranges registered for {bot_name}"),
                    Some(ranges) if ranges.is_empty() => {
                        format!("Empty IP range list for {bot_name}")
                    }
                    Some(_) => format!("Invalid IP address: {ip_address}"),
                };
                IpVerification {
                    verified: false,
                    matched_range: None,
                    bot_name: bot_name.to_string(),
                    detail,
                }
            }
        }
    }

    /// Whether a bot has a non-empty range table.
    pub fn has_ranges(&self, bot_name: &str) -> bool {
        self.ranges
            .get(bot_name)
            .map(|r| !r.is_empty())
            .unwrap_or(false)
    }

    /// Number of ranges loaded for a bot.
    pub fn range_count(&self, bot_name: &str) -> usize {
        self.ranges.get(bot_name).map(|r| r.len()).unwrap_or(0)
    }

    /// Bots that currently have ranges.
    pub fn bots_with_ranges(&self) -> Vec<String> {
        self.ranges
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Snapshot of the loaded table for introspection.
    pub fn stats(&self) -> IpRangeStats {
        let ranges_by_bot: HashMap<String, usize> = self
            .ranges
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().len()))
            .collect();
        IpRangeStats {
            bots_with_ranges: self.bots_with_ranges(),
            total_ranges: ranges_by_bot.values().sum(),
            ranges_by_bot,
        }
    }
}

impl Default for IpRangeVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_range_membership() {
        let verifier = IpRangeVerifier::new();

        let inside = verifier.verify("20.15.240.70", "openai");
        assert!(inside.verified);
        assert_eq!(inside.matched_range.as_deref(), Some("20.15.240.64/28"));

        let outside = verifier.verify("20.15.240.60", "openai");
        assert!(!outside.verified);
        assert!(outside.detail.contains("not in any openai range"));
    }

    #[test]
    fn test_anthropic_slash23_boundaries() {
        let verifier = IpRangeVerifier::new();

        assert!(verifier.verify("160.79.104.1", "anthropic").verified);
        assert!(verifier.verify("160.79.105.254", "anthropic").verified);
        assert!(!verifier.verify("160.79.106.1", "anthropic").verified);
    }

    #[test]
    fn test_unknown_bot_has_no_ranges() {
        let verifier = IpRangeVerifier::new();

        let result = verifier.verify("1.2.3.4", "perplexity");
        assert!(!result.verified);
        assert_eq!(result.detail, "No IP ranges registered for perplexity");
        assert!(!verifier.has_ranges("perplexity"));
    }

    #[test]
    fn test_invalid_ip_address() {
        let verifier = IpRangeVerifier::new();

        let result = verifier.verify("not-an-ip", "openai");
        assert!(!result.verified);
        assert_eq!(result.detail, "Invalid IP address: not-an-ip");
    }

    #[test]
    fn test_missing_ranges_outrank_bad_address() {
        let verifier = IpRangeVerifier::new();

        let result = verifier.verify("not-an-ip", "nobody");
        assert_eq!(result.detail, "No IP ranges registered for nobody");
    }

    #[test]
    fn test_add_ranges_skips_invalid() {
        let verifier = IpRangeVerifier::empty();

        let added = verifier.add_ranges("perplexity", &["107.20.0.0/14", "bogus/99", "m"]);
        assert_eq!(added, 1, "only the valid CIDR should be added");
        assert!(verifier.has_ranges("perplexity"));
        assert!(verifier.verify("107.21.1.1", "perplexity").verified);
    }

    #[test]
    fn test_add_ranges_extends_existing() {
        let verifier = IpRangeVerifier::new();
        let before = verifier.range_count("openai");

        verifier.add_ranges("openai", &["203.0.113.0/24"]);
        assert_eq!(verifier.range_count("openai"), before + 1);
        assert!(verifier.verify("203.0.113.9", "openai").verified);
    }

    #[test]
    fn test_clear_ranges() {
        let verifier = IpRangeVerifier::new();

        verifier.clear_ranges(Some("openai"));
        assert!(!verifier.has_ranges("openai"));
        assert!(verifier.has_ranges("anthropic"));

        verifier.clear_ranges(None);
        assert!(!verifier.has_ranges("anthropic"));
        assert_eq!(verifier.stats().total_ranges, 0);
    }

    #[test]
    fn test_stats_snapshot() {
        let verifier = IpRangeVerifier::new();
        let stats = verifier.stats();

        assert_eq!(stats.total_ranges, 12);
        assert_eq!(stats.ranges_by_bot.get("openai"), Some(&11));
        assert_eq!(stats.ranges_by_bot.get("anthropic"), Some(&1));
        assert!(stats.bots_with_ranges.contains(&"openai".to_string()));
    }

    #[test]
    fn test_ipv6_ranges() {
        let verifier = IpRangeVerifier::empty();
        verifier.add_ranges("openai", &["2001:db8::/32"]);

        assert!(verifier.verify("2001:db8::1", "openai").verified);
        assert!(!verifier.verify("2001:db9::1", "openai").verified);
    }
}
