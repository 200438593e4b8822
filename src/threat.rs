//! Request threat pattern detection.
//!
//! Scans the request target for injection and probe signatures, the user
//! agent for scanner tooling, and flags rarely-legitimate methods. Purely
//! advisory: findings are attached to telemetry and never change the
//! admission decision.

use regex::Regex;
use std::sync::LazyLock;

/// Threat categories scanned over `path?query`, in priority order.
static THREAT_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        (
            "sql_injection",
            r"(%27)|(')|(--)|(%23)|(#)|(union\s+(all\s+)?select)|(select\s+.+\s+from)|(insert\s+into)|(drop\s+table)|(update\s+.+\s+set)|(delete\s+from)|(exec\s*\()|(execute\s*\()",
        ),
        (
            "xss",
            r"(<script)|(javascript\s*:)|(on(error|load|click|mouse|focus|blur)\s*=)|(<img[^>]+onerror)|(<svg[^>]+onload)|(expression\s*\()",
        ),
        (
            "path_traversal",
            r"(\.\./)|(\.\.\\)|(%2e%2e%2f)|(%2e%2e/)|(\.%2e/)|(%2e\./)|(etc/passwd)|(etc/shadow)",
        ),
        (
            "wordpress_probe",
            r"(/wp-admin)|(/wp-content)|(/wp-includes)|(/xmlrpc\.php)|(/wp-login\.php)|(/wp-config)|(/wordpress/)",
        ),
        (
            "admin_probe",
            r"(/phpmyadmin)|(/adminer)|(/admin\.php)|(/manager/)|(/administrator/)|(/cgi-bin/)|(/\.env)|(/\.git)|(/config\.php)|(/database\.yml)",
        ),
    ]
    .into_iter()
    .map(|(kind, pattern)| {
        (
            kind,
            Regex::new(&format!("(?i){pattern}")).expect("valid threat pattern"),
        )
    })
    .collect()
});

/// Scanner and automation tool signatures in the user agent.
static SCANNER_AGENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(nikto)|(sqlmap)|(nmap)|(masscan)|(zgrab)|(gobuster)|(dirbuster)|(wpscan)|(nuclei)|(httpx)|(curl/)|(python-requests)|(go-http-client)|(libwww-perl)|(wget)|(scrapy)",
    )
    .expect("valid scanner pattern")
});

/// Methods that rarely appear in legitimate browser traffic.
const SUSPICIOUS_METHODS: &[&str] = &["TRACE", "TRACK", "OPTIONS", "CONNECT"];

/// A matched threat signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Threat {
    /// Category label
    pub kind: &'static str,
    /// The text that matched
    pub matched: String,
}

/// Scan a request for threat signatures. First match wins.
pub fn detect(path: &str, query: &str, user_agent: Option<&str>, method: &str) -> Option<Threat> {
    let target = if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    };

    for (kind, pattern) in THREAT_PATTERNS.iter() {
        if let Some(m) = pattern.find(&target) {
            return Some(Threat {
                kind,
                matched: m.as_str().to_string(),
            });
        }
    }

    if let Some(ua) = user_agent {
        if let Some(m) = SCANNER_AGENTS.find(ua) {
            return Some(Threat {
                kind: "scanner",
                matched: m.as_str().to_string(),
            });
        }
    }

    if SUSPICIOUS_METHODS.contains(&method) {
        return Some(Threat {
            kind: "suspicious_method",
            matched: method.to_string(),
        });
    }

    None
}
