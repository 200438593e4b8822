//! Forward-confirmed reverse DNS verification for search engine crawlers.
//!
//! FCrDNS is the verification method the major engines document:
//! 1. Reverse DNS: resolve the IP to a hostname
//! 2. Pattern check: the hostname must end with an expected suffix
//! 3. Forward DNS: the hostname must resolve back to the original IP
//!
//! Attackers cannot forge the engines' DNS zones, so a passing check
//! proves the claimed identity. Results are cached per (IP, bot) with a
//! TTL chosen by outcome class.

use crate::cache::{EntryTtl, ExpiringCache};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::TokioAsyncResolver;

/// Failure modes of a raw DNS lookup.
#[derive(Debug, Clone, Error)]
pub enum DnsLookupError {
    /// The name or address exists but has no records of the requested type.
    #[error("no records found")]
    NoRecords,
    /// The lookup did not complete in time.
    #[error("lookup timed out")]
    Timeout,
    /// Any other resolver failure.
    #[error("{0}")]
    Other(String),
}

/// Async DNS lookups, narrowed to the two queries FCrDNS needs.
///
/// Production code uses the system resolver; tests inject scripted
/// implementations.
#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// Resolve an IP address to its PTR hostnames.
    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, DnsLookupError>;

    /// Resolve a hostname to its A/AAAA addresses.
    async fn forward(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsLookupError>;
}

/// `DnsLookup` backed by the tokio trust-dns resolver.
pub struct SystemResolver {
    resolver: TokioAsyncResolver,
}

impl SystemResolver {
    pub fn new() -> Self {
        let resolver =
            TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default());
        Self { resolver }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn map_resolve_error(err: ResolveError) -> DnsLookupError {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => DnsLookupError::NoRecords,
        ResolveErrorKind::Timeout => DnsLookupError::Timeout,
        _ => DnsLookupError::Other(err.to_string()),
    }
}

#[async_trait]
impl DnsLookup for SystemResolver {
    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, DnsLookupError> {
        let lookup = self
            .resolver
            .reverse_lookup(ip)
            .await
            .map_err(map_resolve_error)?;
        Ok(lookup.iter().map(|name| name.to_string()).collect())
    }

    async fn forward(&self, hostname: &str) -> Result<Vec<IpAddr>, DnsLookupError> {
        let lookup = self
            .resolver
            .lookup_ip(hostname)
            .await
            .map_err(map_resolve_error)?;
        Ok(lookup.iter().collect())
    }
}

/// Outcome class of a verification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsStatus {
    /// Full FCrDNS chain confirmed
    Verified,
    /// Hostname did not match any expected suffix
    FailedPattern,
    /// Forward lookup did not confirm the IP
    FailedForward,
    /// No reverse DNS record
    FailedNoPtr,
    /// Resolver failure
    FailedDnsError,
    /// Served from cache
    Cached,
}

impl DnsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DnsStatus::Verified => "verified",
            DnsStatus::FailedPattern => "failed_pattern",
            DnsStatus::FailedForward => "failed_forward",
            DnsStatus::FailedNoPtr => "failed_no_ptr",
            DnsStatus::FailedDnsError => "failed_dns_error",
            DnsStatus::Cached => "cached",
        }
    }
}

/// Result of an FCrDNS verification attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct DnsVerification {
    /// Whether the full chain was confirmed
    pub verified: bool,
    /// Outcome class
    pub status: DnsStatus,
    /// Hostname from the reverse lookup, when one was found
    pub hostname: Option<String>,
    /// Human-readable explanation
    pub detail: String,
    /// Whether this result was served from cache
    pub cached: bool,
}

impl DnsVerification {
    fn outcome(verified: bool, status: DnsStatus, hostname: Option<String>, detail: String) -> Self {
        Self {
            verified,
            status,
            hostname,
            detail,
            cached: false,
        }
    }

    /// Copy of a stored result as seen by a cache hit.
    fn as_cached(&self) -> Self {
        Self {
            verified: self.verified,
            status: DnsStatus::Cached,
            hostname: self.hostname.clone(),
            detail: format!("Cached: {}", self.status.as_str()),
            cached: true,
        }
    }
}

impl EntryTtl for DnsVerification {
    fn ttl(&self) -> Duration {
        let secs = match self.status {
            DnsStatus::Verified => DnsVerifier::TTL_VERIFIED,
            DnsStatus::FailedPattern | DnsStatus::FailedForward => DnsVerifier::TTL_FAILED,
            _ => DnsVerifier::TTL_ERROR,
        };
        Duration::from_secs(secs)
    }
}

/// FCrDNS verifier with outcome-class caching.
pub struct DnsVerifier {
    resolver: Arc<dyn DnsLookup>,
    cache: ExpiringCache<(IpAddr, String), DnsVerification>,
}

impl DnsVerifier {
    /// Confirmed identities are stable for a day.
    pub const TTL_VERIFIED: u64 = 86_400;
    /// Definitive failures may retry after an hour.
    pub const TTL_FAILED: u64 = 3_600;
    /// Missing PTRs and resolver errors are often transient.
    pub const TTL_ERROR: u64 = 300;

    /// Create a verifier using the system resolver.
    pub fn new() -> Self {
        Self::with_resolver(Arc::new(SystemResolver::new()))
    }

    /// Create a verifier with an injected resolver.
    pub fn with_resolver(resolver: Arc<dyn DnsLookup>) -> Self {
        Self {
            resolver,
            cache: ExpiringCache::new("dns_verification", 10_000),
        }
    }

    /// Verify an IP against the expected reverse-DNS suffixes for a bot.
    ///
    /// Never returns an error: every failure mode is a classified,
    /// cacheable outcome.
    pub async fn verify_fcrdns(
        &self,
        ip: IpAddr,
        expected_suffixes: &[&str],
        bot_name: &str,
    ) -> DnsVerification {
        let cache_key = (ip, bot_name.to_string());

        if let Some(stored) = self.cache.get(&cache_key).await {
            debug!(ip = %ip, bot = bot_name, status = stored.status.as_str(), "DNS verification cache hit");
            return stored.as_cached();
        }

        let result = self.lookup_chain(ip, expected_suffixes, bot_name).await;
        self.cache.insert(cache_key, result.clone()).await;
        result
    }

    async fn lookup_chain(
        &self,
        ip: IpAddr,
        expected_suffixes: &[&str],
        bot_name: &str,
    ) -> DnsVerification {
        // Step 1: reverse lookup, IP to hostname
        let hostnames = match self.resolver.reverse(ip).await {
            Ok(names) => names,
            Err(DnsLookupError::NoRecords) => {
                info!(bot = bot_name, ip = %ip, "FCrDNS failed: no PTR record");
                return DnsVerification::outcome(
                    false,
                    DnsStatus::FailedNoPtr,
                    None,
                    format!("No PTR record for {ip}"),
                );
            }
            Err(err) => {
                error!(bot = bot_name, ip = %ip, error = %err, "DNS error during reverse lookup");
                return DnsVerification::outcome(
                    false,
                    DnsStatus::FailedDnsError,
                    None,
                    format!("DNS error: {err}"),
                );
            }
        };

        let hostnames: Vec<String> = hostnames
            .iter()
            .map(|h| h.trim_end_matches('.').to_lowercase())
            .collect();

        if hostnames.is_empty() {
            info!(bot = bot_name, ip = %ip, "FCrDNS failed: no PTR record");
            return DnsVerification::outcome(
                false,
                DnsStatus::FailedNoPtr,
                None,
                format!("No PTR record for {ip}"),
            );
        }

        // Step 2: hostname must end with an expected suffix. This is the
        // anti-spoofing step; an attacker controls their own PTR but not
        // the engine's domain.
        let hostname = match hostnames.iter().find(|host| {
            expected_suffixes
                .iter()
                .any(|suffix| host.ends_with(&suffix.to_lowercase()))
        }) {
            Some(host) => host.clone(),
            None => {
                let hostname = hostnames[0].clone();
                warn!(
                    bot = bot_name,
                    ip = %ip,
                    hostname = %hostname,
                    expected = ?expected_suffixes,
                    "FCrDNS failed: hostname does not match expected patterns"
                );
                return DnsVerification::outcome(
                    false,
                    DnsStatus::FailedPattern,
                    Some(hostname.clone()),
                    format!("Hostname {hostname} doesn't match patterns {expected_suffixes:?}"),
                );
            }
        };

        // Step 3: forward lookup must confirm the original IP
        let resolved = match self.resolver.forward(&hostname).await {
            Ok(ips) => ips,
            Err(DnsLookupError::NoRecords) => Vec::new(),
            Err(err) => {
                error!(bot = bot_name, ip = %ip, error = %err, "DNS error during forward lookup");
                return DnsVerification::outcome(
                    false,
                    DnsStatus::FailedDnsError,
                    Some(hostname),
                    format!("DNS error: {err}"),
                );
            }
        };

        if !resolved.contains(&ip) {
            warn!(
                bot = bot_name,
                ip = %ip,
                hostname = %hostname,
                resolved = ?resolved,
                "FCrDNS failed: forward DNS mismatch"
            );
            return DnsVerification::outcome(
                false,
                DnsStatus::FailedForward,
                Some(hostname.clone()),
                format!("Forward DNS for {hostname} returned {resolved:?}, expected {ip}"),
            );
        }

        info!(bot = bot_name, ip = %ip, hostname = %hostname, "FCrDNS verified");
        DnsVerification::outcome(
            true,
            DnsStatus::Verified,
            Some(hostname.clone()),
            format!("Verified via FCrDNS: {hostname}"),
        )
    }

    /// Number of cached verification results.
    pub fn cache_entries(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Drop all cached results.
    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for DnsVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubResolver {
        reverse: Result<Vec<String>, DnsLookupError>,
        forward: Result<Vec<IpAddr>, DnsLookupError>,
        reverse_calls: AtomicUsize,
    }

    impl StubResolver {
        fn new(
            reverse: Result<Vec<String>, DnsLookupError>,
            forward: Result<Vec<IpAddr>, DnsLookupError>,
        ) -> Arc<Self> {
            Arc::new(Self {
                reverse,
                forward,
                reverse_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DnsLookup for StubResolver {
        async fn reverse(&self, _ip: IpAddr) -> Result<Vec<String>, DnsLookupError> {
            self.reverse_calls.fetch_add(1, Ordering::SeqCst);
            self.reverse.clone()
        }

        async fn forward(&self, _hostname: &str) -> Result<Vec<IpAddr>, DnsLookupError> {
            self.forward.clone()
        }
    }

    const GOOGLE_SUFFIXES: &[&str] = &[".googlebot.com", ".google.com"];

    fn google_ip() -> IpAddr {
        "66.249.66.1".parse().unwrap()
    }

    #[tokio::test]
    async fn test_full_chain_verifies() {
        let resolver = StubResolver::new(
            Ok(vec!["crawl-66-249-66-1.googlebot.com.".to_string()]),
            Ok(vec![google_ip()]),
        );
        let verifier = DnsVerifier::with_resolver(resolver);

        let result = verifier
            .verify_fcrdns(google_ip(), GOOGLE_SUFFIXES, "google")
            .await;

        assert!(result.verified);
        assert_eq!(result.status, DnsStatus::Verified);
        assert_eq!(
            result.hostname.as_deref(),
            Some("crawl-66-249-66-1.googlebot.com"),
            "hostname should be lowercased with the trailing dot stripped"
        );
        assert!(!result.cached);
    }

    #[tokio::test]
    async fn test_no_ptr_record() {
        let resolver = StubResolver::new(Err(DnsLookupError::NoRecords), Ok(vec![]));
        let verifier = DnsVerifier::with_resolver(resolver);

        let result = verifier
            .verify_fcrdns(google_ip(), GOOGLE_SUFFIXES, "google")
            .await;

        assert!(!result.verified);
        assert_eq!(result.status, DnsStatus::FailedNoPtr);
        assert!(result.detail.contains("No PTR record"));
    }

    #[tokio::test]
    async fn test_hostname_pattern_mismatch() {
        let resolver = StubResolver::new(
            Ok(vec!["fake-crawler.attacker.example.".to_string()]),
            Ok(vec![google_ip()]),
        );
        let verifier = DnsVerifier::with_resolver(resolver);

        let result = verifier
            .verify_fcrdns(google_ip(), GOOGLE_SUFFIXES, "google")
            .await;

        assert!(!result.verified);
        assert_eq!(result.status, DnsStatus::FailedPattern);
        assert_eq!(result.hostname.as_deref(), Some("fake-crawler.attacker.example"));
    }

    #[tokio::test]
    async fn test_forward_mismatch() {
        let resolver = StubResolver::new(
            Ok(vec!["crawl-66-249-66-1.googlebot.com.".to_string()]),
            Ok(vec!["1.2.3.4".parse().unwrap()]),
        );
        let verifier = DnsVerifier::with_resolver(resolver);

        let result = verifier
            .verify_fcrdns(google_ip(), GOOGLE_SUFFIXES, "google")
            .await;

        assert!(!result.verified);
        assert_eq!(result.status, DnsStatus::FailedForward);
    }

    #[tokio::test]
    async fn test_forward_no_records_is_forward_failure() {
        let resolver = StubResolver::new(
            Ok(vec!["crawl-66-249-66-1.googlebot.com.".to_string()]),
            Err(DnsLookupError::NoRecords),
        );
        let verifier = DnsVerifier::with_resolver(resolver);

        let result = verifier
            .verify_fcrdns(google_ip(), GOOGLE_SUFFIXES, "google")
            .await;

        assert_eq!(result.status, DnsStatus::FailedForward);
    }

    #[tokio::test]
    async fn test_resolver_error() {
        let resolver = StubResolver::new(
            Err(DnsLookupError::Other("connection refused".to_string())),
            Ok(vec![]),
        );
        let verifier = DnsVerifier::with_resolver(resolver);

        let result = verifier
            .verify_fcrdns(google_ip(), GOOGLE_SUFFIXES, "google")
            .await;

        assert!(!result.verified);
        assert_eq!(result.status, DnsStatus::FailedDnsError);
        assert!(result.detail.contains("DNS error"));
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let resolver = StubResolver::new(
            Ok(vec!["crawl-66-249-66-1.googlebot.com.".to_string()]),
            Ok(vec![google_ip()]),
        );
        let verifier = DnsVerifier::with_resolver(resolver.clone());

        let first = verifier
            .verify_fcrdns(google_ip(), GOOGLE_SUFFIXES, "google")
            .await;
        let second = verifier
            .verify_fcrdns(google_ip(), GOOGLE_SUFFIXES, "google")
            .await;

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.status, DnsStatus::Cached);
        assert_eq!(second.detail, "Cached: verified");
        assert!(second.verified, "cache hit must preserve the verdict");
        assert_eq!(
            resolver.reverse_calls.load(Ordering::SeqCst),
            1,
            "second call must not hit the resolver"
        );
    }

    #[tokio::test]
    async fn test_failures_are_cached_too() {
        let resolver = StubResolver::new(Err(DnsLookupError::NoRecords), Ok(vec![]));
        let verifier = DnsVerifier::with_resolver(resolver.clone());

        verifier
            .verify_fcrdns(google_ip(), GOOGLE_SUFFIXES, "google")
            .await;
        let second = verifier
            .verify_fcrdns(google_ip(), GOOGLE_SUFFIXES, "google")
            .await;

        assert!(second.cached);
        assert!(!second.verified);
        assert_eq!(second.detail, "Cached: failed_no_ptr");
        assert_eq!(resolver.reverse_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_keyed_by_bot_name() {
        let resolver = StubResolver::new(
            Ok(vec!["crawl-66-249-66-1.googlebot.com.".to_string()]),
            Ok(vec![google_ip()]),
        );
        let verifier = DnsVerifier::with_resolver(resolver.clone());

        verifier
            .verify_fcrdns(google_ip(), GOOGLE_SUFFIXES, "google")
            .await;
        verifier
            .verify_fcrdns(google_ip(), &[".search.msn.com"], "bing")
            .await;

        assert_eq!(
            resolver.reverse_calls.load(Ordering::SeqCst),
            2,
            "different bot names must be verified independently"
        );
    }
}
