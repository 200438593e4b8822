//! Bot trust tiers and classification results.

use serde::{Deserialize, Serialize};

/// Trust tier assigned to a request after bot verification.
///
/// Variants are declared from least to most trusted, so tiers can be
/// compared directly. The two verified tiers receive identical treatment.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BotTier {
    /// Known attack tooling, denied outright
    Blocked,
    /// No bot identity claimed
    #[default]
    Anonymous,
    /// Claimed a crawler identity that failed network verification
    UnverifiedClaim,
    /// Benign bot on the reputation list (SEO tools, link previews, monitors)
    Allowed,
    /// AI crawler confirmed against its published IP ranges
    VerifiedAi,
    /// Search engine crawler confirmed by forward-confirmed reverse DNS
    VerifiedSearch,
}

impl BotTier {
    /// Returns true if the identity was confirmed by a network check.
    pub fn is_verified(&self) -> bool {
        matches!(self, BotTier::VerifiedSearch | BotTier::VerifiedAi)
    }

    /// Returns true for tiers that get elevated treatment.
    pub fn is_trusted(&self) -> bool {
        self.is_verified() || matches!(self, BotTier::Allowed)
    }

    /// Returns true if the request claimed an identity it could not prove.
    pub fn is_suspicious(&self) -> bool {
        matches!(self, BotTier::UnverifiedClaim)
    }

    /// Verified crawlers are never rate limited.
    pub fn bypasses_rate_limit(&self) -> bool {
        self.is_verified()
    }

    /// Returns the tier as a string for headers and rate-limit keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            BotTier::Blocked => "blocked",
            BotTier::Anonymous => "anonymous",
            BotTier::UnverifiedClaim => "unverified_claim",
            BotTier::Allowed => "allowed",
            BotTier::VerifiedAi => "verified_ai",
            BotTier::VerifiedSearch => "verified_search",
        }
    }
}

/// How a claimed bot identity was confirmed or matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    /// Forward-confirmed reverse DNS
    Fcrdns,
    /// Published IP range membership
    IpRange,
    /// User-agent pattern match only
    UaMatch,
}

/// Classification verdict for a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    /// Assigned trust tier
    pub tier: BotTier,

    /// Bot identity the user agent claimed, if any
    pub claimed_bot: Option<String>,

    /// Identity that survived verification
    pub verified_as: Option<String>,

    /// Check that produced the verdict
    pub method: Option<VerificationMethod>,

    /// Human-readable explanation for logs
    pub detail: String,
}

impl Classification {
    /// Classification for a user agent matching an attack-tool pattern.
    pub fn blocked(detail: impl Into<String>) -> Self {
        Self {
            tier: BotTier::Blocked,
            claimed_bot: None,
            verified_as: None,
            method: None,
            detail: detail.into(),
        }
    }

    /// Classification for traffic with no recognized bot signature.
    pub fn anonymous() -> Self {
        Self {
            tier: BotTier::Anonymous,
            claimed_bot: None,
            verified_as: None,
            method: None,
            detail: "No bot pattern matched".to_string(),
        }
    }

    /// Classification for a bot on the reputation allow-list.
    pub fn allowed(claimed: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            tier: BotTier::Allowed,
            claimed_bot: Some(claimed.into()),
            verified_as: None,
            method: Some(VerificationMethod::UaMatch),
            detail: detail.into(),
        }
    }

    /// Classification for a search crawler that passed FCrDNS.
    pub fn verified_search(bot: impl Into<String>, detail: impl Into<String>) -> Self {
        let bot = bot.into();
        Self {
            tier: BotTier::VerifiedSearch,
            claimed_bot: Some(bot.clone()),
            verified_as: Some(bot),
            method: Some(VerificationMethod::Fcrdns),
            detail: detail.into(),
        }
    }

    /// Classification for an AI crawler confirmed by IP range.
    pub fn verified_ai(bot: impl Into<String>, detail: impl Into<String>) -> Self {
        let bot = bot.into();
        Self {
            tier: BotTier::VerifiedAi,
            claimed_bot: Some(bot.clone()),
            verified_as: Some(bot),
            method: Some(VerificationMethod::IpRange),
            detail: detail.into(),
        }
    }

    /// Classification for a crawler claim that failed verification.
    pub fn unverified_claim(
        bot: impl Into<String>,
        method: VerificationMethod,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            tier: BotTier::UnverifiedClaim,
            claimed_bot: Some(bot.into()),
            verified_as: None,
            method: Some(method),
            detail: detail.into(),
        }
    }
}
