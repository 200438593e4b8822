//! Bot identity verification.
//!
//! Combines user-agent signature matching with network verification so a
//! spoofed crawler UA never earns crawler treatment. Search engines are
//! confirmed by FCrDNS, AI crawlers by their published IP ranges, and a
//! claim that fails its check lands in the most throttled tier.

pub mod dns;
pub mod ip;
pub mod registry;

pub use dns::{
    DnsLookup, DnsLookupError, DnsStatus, DnsVerification, DnsVerifier, SystemResolver,
};
pub use ip::{IpRangeStats, IpRangeVerifier, IpVerification};

use crate::tier::{BotTier, Classification, VerificationMethod};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Classification ladder over the verifier components.
///
/// Decision order: blocked tools, search claims, AI claims, allowed
/// bots, anonymous. Blocked matches short-circuit before any network
/// lookups are attempted.
pub struct BotVerifier {
    dns: Arc<DnsVerifier>,
    ip: Arc<IpRangeVerifier>,
}

impl BotVerifier {
    /// Create a verifier with the system resolver and default IP tables.
    pub fn new() -> Self {
        Self {
            dns: Arc::new(DnsVerifier::new()),
            ip: Arc::new(IpRangeVerifier::new()),
        }
    }

    /// Create a verifier from injected components.
    pub fn with_verifiers(dns: Arc<DnsVerifier>, ip: Arc<IpRangeVerifier>) -> Self {
        Self { dns, ip }
    }

    /// The DNS verifier, for stats and cache control.
    pub fn dns_verifier(&self) -> &Arc<DnsVerifier> {
        &self.dns
    }

    /// The IP range verifier, for stats and runtime range updates.
    pub fn ip_verifier(&self) -> &Arc<IpRangeVerifier> {
        &self.ip
    }

    /// Classify a request by user agent and client IP.
    pub async fn verify(&self, user_agent: Option<&str>, client_ip: IpAddr) -> Classification {
        let ua = user_agent.unwrap_or("");

        if registry::is_blocked(ua) {
            warn!(ip = %client_ip, "Blocked attack tool detected");
            return Classification::blocked("Blocked attack tool pattern matched");
        }

        if let Some(bot_name) = registry::identify_search_bot(ua) {
            return self.verify_search_bot(bot_name, client_ip).await;
        }

        if let Some(crawler_name) = registry::identify_ai_crawler(ua) {
            return self.verify_ai_crawler(crawler_name, client_ip);
        }

        if registry::is_allowed_bot(ua) {
            return Classification::allowed("allowed_bot", "Matched allowed bot pattern");
        }

        Classification::anonymous()
    }

    /// Classify without awaiting network checks.
    ///
    /// Search claims cannot be confirmed synchronously, so they resolve
    /// to the unverified tier. Prefer `verify` when async is available.
    pub fn verify_sync(&self, user_agent: Option<&str>, client_ip: IpAddr) -> Classification {
        let ua = user_agent.unwrap_or("");

        if registry::is_blocked(ua) {
            return Classification::blocked("Blocked attack tool pattern matched");
        }

        if let Some(bot_name) = registry::identify_search_bot(ua) {
            return Classification {
                tier: BotTier::UnverifiedClaim,
                claimed_bot: Some(bot_name.to_string()),
                verified_as: None,
                method: None,
                detail: "FCrDNS verification requires the async verify path".to_string(),
            };
        }

        if let Some(crawler_name) = registry::identify_ai_crawler(ua) {
            return self.verify_ai_crawler(crawler_name, client_ip);
        }

        if registry::is_allowed_bot(ua) {
            return Classification::allowed("allowed_bot", "Matched allowed bot pattern");
        }

        Classification::anonymous()
    }

    async fn verify_search_bot(&self, bot_name: &str, client_ip: IpAddr) -> Classification {
        let suffixes = registry::dns_suffixes(bot_name);

        if suffixes.is_empty() {
            debug!(bot = bot_name, "No FCrDNS patterns for claimed search bot");
            return Classification::allowed(
                bot_name,
                format!("No FCrDNS patterns available for {bot_name}"),
            );
        }

        let dns_result = self.dns.verify_fcrdns(client_ip, suffixes, bot_name).await;

        if dns_result.verified {
            let hostname = dns_result.hostname.as_deref().unwrap_or_default();
            return Classification::verified_search(
                bot_name,
                format!("FCrDNS verified: {hostname}"),
            );
        }

        warn!(
            claimed = bot_name,
            ip = %client_ip,
            reason = dns_result.status.as_str(),
            "Search bot verification failed"
        );
        Classification::unverified_claim(
            bot_name,
            VerificationMethod::Fcrdns,
            format!("FCrDNS verification failed: {}", dns_result.detail),
        )
    }

    fn verify_ai_crawler(&self, crawler_name: &str, client_ip: IpAddr) -> Classification {
        if !self.ip.has_ranges(crawler_name) {
            return Classification::allowed(
                crawler_name,
                format!("No IP ranges available for {crawler_name}"),
            );
        }

        let ip_result = self.ip.verify_addr(client_ip, crawler_name);

        if ip_result.verified {
            let range = ip_result.matched_range.as_deref().unwrap_or_default();
            return Classification::verified_ai(crawler_name, format!("IP verified in {range}"));
        }

        warn!(
            claimed = crawler_name,
            ip = %client_ip,
            reason = %ip_result.detail,
            "AI crawler verification failed"
        );
        Classification::unverified_claim(
            crawler_name,
            VerificationMethod::IpRange,
            format!("IP verification failed: {}", ip_result.detail),
        )
    }
}

impl Default for BotVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct ScriptedResolver {
        reverse: Result<Vec<String>, DnsLookupError>,
        forward: Result<Vec<IpAddr>, DnsLookupError>,
    }

    #[async_trait]
    impl DnsLookup for ScriptedResolver {
        async fn reverse(&self, _ip: IpAddr) -> Result<Vec<String>, DnsLookupError> {
            self.reverse.clone()
        }

        async fn forward(&self, _hostname: &str) -> Result<Vec<IpAddr>, DnsLookupError> {
            self.forward.clone()
        }
    }

    /// Resolver that fails the test if any lookup is attempted.
    struct PanicResolver;

    #[async_trait]
    impl DnsLookup for PanicResolver {
        async fn reverse(&self, _ip: IpAddr) -> Result<Vec<String>, DnsLookupError> {
            panic!("reverse lookup must not be called");
        }

        async fn forward(&self, _hostname: &str) -> Result<Vec<IpAddr>, DnsLookupError> {
            panic!("forward lookup must not be called");
        }
    }

    fn verifier_with(resolver: impl DnsLookup + 'static) -> BotVerifier {
        BotVerifier::with_verifiers(
            Arc::new(DnsVerifier::with_resolver(Arc::new(resolver))),
            Arc::new(IpRangeVerifier::new()),
        )
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_blocked_tool_skips_all_lookups() {
        let verifier = verifier_with(PanicResolver);

        let result = verifier.verify(Some("sqlmap/1.7"), ip("1.2.3.4")).await;

        assert_eq!(result.tier, BotTier::Blocked);
        assert_eq!(result.detail, "Blocked attack tool pattern matched");
    }

    #[tokio::test]
    async fn test_blocked_outranks_trusted_claim() {
        let verifier = verifier_with(PanicResolver);

        // A UA naming both a crawler and an attack tool is denied outright
        let result = verifier
            .verify(
                Some("Mozilla/5.0 (compatible; Googlebot/2.1) sqlmap/1.7"),
                ip("66.249.66.1"),
            )
            .await;

        assert_eq!(result.tier, BotTier::Blocked);
    }

    #[tokio::test]
    async fn test_search_bot_verified_by_fcrdns() {
        let googlebot_ip = ip("66.249.66.1");
        let verifier = verifier_with(ScriptedResolver {
            reverse: Ok(vec!["crawl-66-249-66-1.googlebot.com.".to_string()]),
            forward: Ok(vec![googlebot_ip]),
        });

        let result = verifier
            .verify(Some("Mozilla/5.0 (compatible; Googlebot/2.1)"), googlebot_ip)
            .await;

        assert_eq!(result.tier, BotTier::VerifiedSearch);
        assert_eq!(result.verified_as.as_deref(), Some("google"));
        assert_eq!(result.method, Some(VerificationMethod::Fcrdns));
        assert!(result.detail.contains("crawl-66-249-66-1.googlebot.com"));
    }

    #[tokio::test]
    async fn test_spoofed_search_bot_is_unverified_claim() {
        let verifier = verifier_with(ScriptedResolver {
            reverse: Err(DnsLookupError::NoRecords),
            forward: Ok(vec![]),
        });

        let result = verifier
            .verify(Some("Mozilla/5.0 (compatible; Googlebot/2.1)"), ip("1.2.3.4"))
            .await;

        assert_eq!(result.tier, BotTier::UnverifiedClaim);
        assert_eq!(result.claimed_bot.as_deref(), Some("google"));
        assert!(result.verified_as.is_none());
        assert!(result.detail.starts_with("FCrDNS verification failed"));
    }

    #[tokio::test]
    async fn test_ai_crawler_verified_by_ip_range() {
        let verifier = verifier_with(PanicResolver);

        let result = verifier
            .verify(Some("GPTBot/1.0"), ip("20.15.240.70"))
            .await;

        assert_eq!(result.tier, BotTier::VerifiedAi);
        assert_eq!(result.verified_as.as_deref(), Some("openai"));
        assert_eq!(result.method, Some(VerificationMethod::IpRange));
    }

    #[tokio::test]
    async fn test_ai_crawler_outside_ranges_is_unverified() {
        let verifier = verifier_with(PanicResolver);

        let result = verifier.verify(Some("GPTBot/1.0"), ip("1.2.3.4")).await;

        assert_eq!(result.tier, BotTier::UnverifiedClaim);
        assert_eq!(result.method, Some(VerificationMethod::IpRange));
        assert!(result.detail.starts_with("IP verification failed"));
    }

    #[tokio::test]
    async fn test_ai_crawler_without_ranges_is_allowed() {
        let verifier = verifier_with(PanicResolver);

        let result = verifier
            .verify(Some("PerplexityBot/1.0"), ip("1.2.3.4"))
            .await;

        assert_eq!(result.tier, BotTier::Allowed);
        assert_eq!(result.detail, "No IP ranges available for perplexity");
    }

    #[tokio::test]
    async fn test_allowed_bot_matches_reputation_list() {
        let verifier = verifier_with(PanicResolver);

        let result = verifier
            .verify(Some("Mozilla/5.0 (compatible; AhrefsBot/7.0)"), ip("1.2.3.4"))
            .await;

        assert_eq!(result.tier, BotTier::Allowed);
        assert_eq!(result.claimed_bot.as_deref(), Some("allowed_bot"));
        assert_eq!(result.method, Some(VerificationMethod::UaMatch));
    }

    #[tokio::test]
    async fn test_plain_browser_is_anonymous() {
        let verifier = verifier_with(PanicResolver);

        let result = verifier
            .verify(
                Some("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)"),
                ip("1.2.3.4"),
            )
            .await;

        assert_eq!(result.tier, BotTier::Anonymous);
        assert_eq!(result.detail, "No bot pattern matched");
    }

    #[tokio::test]
    async fn test_missing_user_agent_is_anonymous() {
        let verifier = verifier_with(PanicResolver);

        let result = verifier.verify(None, ip("1.2.3.4")).await;
        assert_eq!(result.tier, BotTier::Anonymous);
    }

    #[test]
    fn test_sync_search_claim_never_upgrades() {
        let verifier = verifier_with(PanicResolver);

        let result = verifier.verify_sync(Some("Googlebot/2.1"), ip("66.249.66.1"));

        assert_eq!(result.tier, BotTier::UnverifiedClaim);
        assert!(result.method.is_none());
    }

    #[test]
    fn test_sync_ai_verification_still_works() {
        let verifier = verifier_with(PanicResolver);

        let result = verifier.verify_sync(Some("GPTBot/1.0"), ip("20.15.240.70"));
        assert_eq!(result.tier, BotTier::VerifiedAi);
    }
}
