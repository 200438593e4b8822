//! Static bot signature tables.
//!
//! Pure lookup functions over the user agent. Matching is case-insensitive
//! substring containment; blocked patterns are compiled regexes. The first
//! matching category wins.

use regex::Regex;
use std::sync::LazyLock;

/// Search engine crawlers, verified via FCrDNS.
static SEARCH_BOTS: &[(&str, &[&str])] = &[
    (
        "google",
        &[
            "googlebot",
            "google-extended",
            "googleother",
            "google-inspectiontool",
            "storebot-google",
            "apis-google",
        ],
    ),
    ("bing", &["bingbot", "bingpreview", "msnbot"]),
    ("apple", &["applebot", "applebot-extended"]),
    (
        "yandex",
        &[
            "yandexbot",
            "yandexaccessibilitybot",
            "yandexmobilebot",
            "yandexdirectdyn",
            "yandexscreenshotbot",
            "yandexblogs",
            "yandexfavicons",
            "yandexvideo",
            "yandexwebmaster",
            "yandexnews",
        ],
    ),
    ("duckduckgo", &["duckduckbot", "duckduckgo-favicons-bot"]),
    (
        "baidu",
        &[
            "baiduspider",
            "baiduspider-mobile",
            "baiduspider-image",
            "baiduspider-video",
            "baiduspider-news",
        ],
    ),
];

/// Expected reverse-DNS suffixes per search bot category.
static DNS_SUFFIXES: &[(&str, &[&str])] = &[
    ("google", &[".googlebot.com", ".google.com"]),
    ("bing", &[".search.msn.com"]),
    ("apple", &[".applebot.apple.com"]),
    ("yandex", &[".yandex.ru", ".yandex.net", ".yandex.com"]),
    ("duckduckgo", &[".duckduckgo.com"]),
    ("baidu", &[".baidu.com", ".baidu.jp"]),
];

/// AI crawlers, verified via published IP ranges.
static AI_CRAWLERS: &[(&str, &[&str])] = &[
    ("openai", &["gptbot", "chatgpt-user", "oai-searchbot"]),
    ("anthropic", &["claudebot", "claude-web", "anthropic-ai"]),
    ("perplexity", &["perplexitybot"]),
    (
        "meta",
        &["meta-externalagent", "meta-externalfetcher", "facebookbot"],
    ),
    ("google_ai", &["gemini"]),
    ("xai", &["xai", "grok"]),
    ("amazon", &["amazonbot"]),
    ("cohere", &["cohere-ai"]),
    ("bytedance", &["bytespider"]),
    ("commoncrawl", &["ccbot"]),
];

/// Benign bots allowed on reputation alone: link previews, SEO tools,
/// uptime monitors, feed readers, archivers.
static ALLOWED_BOTS: &[&str] = &[
    "testclient",
    "facebookexternalhit",
    "twitterbot",
    "linkedinbot",
    "discordbot",
    "slackbot",
    "telegrambot",
    "whatsapp",
    "pinterestbot",
    "redditbot",
    "ahrefsbot",
    "semrushbot",
    "mj12bot",
    "dotbot",
    "seranking",
    "dataforseobot",
    "serpstatbot",
    "rogerbot",
    "screaming frog",
    "uptimerobot",
    "pingdom",
    "gtmetrix",
    "lighthouse",
    "pagespeedonline",
    "chrome-lighthouse",
    "feedly",
    "feedbin",
    "newsblur",
    "neevabot",
    "img2dataset",
    "archive.org_bot",
    "ia_archiver",
];

/// Attack tool signatures, denied outright.
static BLOCKED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        "nikto",
        "sqlmap",
        "masscan",
        "nmap",
        "wp-scan",
        "wpscan",
        "havij",
        "acunetix",
        "nessus",
        "openvas",
        "burpsuite",
        "dirbuster",
        "gobuster",
        "nuclei",
        "zgrab",
        "wfuzz",
        "hydra",
        "metasploit",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).expect("valid blocked pattern"))
    .collect()
});

/// Identify a claimed search engine crawler, returning its category.
pub fn identify_search_bot(user_agent: &str) -> Option<&'static str> {
    if user_agent.is_empty() {
        return None;
    }
    let ua = user_agent.to_lowercase();
    SEARCH_BOTS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| ua.contains(p)))
        .map(|(category, _)| *category)
}

/// Expected reverse-DNS suffixes for a search bot category.
pub fn dns_suffixes(category: &str) -> &'static [&'static str] {
    DNS_SUFFIXES
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, suffixes)| *suffixes)
        .unwrap_or(&[])
}

/// Identify a claimed AI crawler, returning its operator name.
pub fn identify_ai_crawler(user_agent: &str) -> Option<&'static str> {
    if user_agent.is_empty() {
        return None;
    }
    let ua = user_agent.to_lowercase();
    AI_CRAWLERS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| ua.contains(p)))
        .map(|(name, _)| *name)
}

/// Check the reputation allow-list.
pub fn is_allowed_bot(user_agent: &str) -> bool {
    if user_agent.is_empty() {
        return false;
    }
    let ua = user_agent.to_lowercase();
    ALLOWED_BOTS.iter().any(|bot| ua.contains(bot))
}

/// Check for attack tool signatures.
pub fn is_blocked(user_agent: &str) -> bool {
    if user_agent.is_empty() {
        return false;
    }
    BLOCKED_PATTERNS.iter().any(|p| p.is_match(user_agent))
}
