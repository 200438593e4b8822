//! Request context assembled from the incoming HTTP request.

use std::collections::HashMap;
use std::net::IpAddr;

/// Snapshot of the request fields the inspection pipeline reads.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request headers (lowercase keys)
    pub headers: HashMap<String, Vec<String>>,
    /// Client IP address after proxy-header resolution
    pub client_ip: IpAddr,
    /// Request path
    pub path: String,
    /// Raw query string, empty when absent
    pub query: String,
    /// HTTP method
    pub method: String,
    /// Request id, taken from CF-Ray when fronted by Cloudflare
    pub ray_id: String,
}

impl RequestContext {
    /// Build a context, resolving the client IP from proxy headers.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        query: impl Into<String>,
        headers: HashMap<String, Vec<String>>,
        peer_addr: IpAddr,
    ) -> Self {
        let client_ip = resolve_client_ip(&headers, peer_addr);
        let ray_id = first_header(&headers, "cf-ray")
            .unwrap_or("local")
            .to_string();
        Self {
            headers,
            client_ip,
            path: path.into(),
            query: query.into(),
            method: method.into(),
            ray_id,
        }
    }

    /// Get a single header value (first if multiple).
    pub fn header(&self, name: &str) -> Option<&str> {
        first_header(&self.headers, &name.to_lowercase())
    }

    /// Get the User-Agent header.
    pub fn user_agent(&self) -> Option<&str> {
        self.header("user-agent")
    }

    /// Get the edge-provided country code, if any.
    pub fn country(&self) -> Option<&str> {
        self.header("cf-ipcountry")
    }

    /// Get the Referer header.
    pub fn referer(&self) -> Option<&str> {
        self.header("referer")
    }
}

fn first_header<'a>(headers: &'a HashMap<String, Vec<String>>, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.first()).map(|s| s.as_str())
}

/// Resolve the real client IP behind proxies.
///
/// Precedence: CF-Connecting-IP, then the first X-Forwarded-For entry,
/// then X-Real-IP, then the socket peer address. Unparseable header
/// values fall through to the next source.
fn resolve_client_ip(headers: &HashMap<String, Vec<String>>, peer_addr: IpAddr) -> IpAddr {
    if let Some(ip) = first_header(headers, "cf-connecting-ip")
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
    {
        return ip;
    }

    if let Some(ip) = first_header(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
    {
        return ip;
    }

    if let Some(ip) =
        first_header(headers, "x-real-ip").and_then(|v| v.trim().parse::<IpAddr>().ok())
    {
        return ip;
    }

    peer_addr
}
