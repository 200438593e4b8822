//! HTTP middleware layers.
//!
//! Two layers wrap every route: the gate middleware runs the admission
//! pipeline and annotates responses with classification and rate-limit
//! headers, and the security-headers middleware applies the hardened
//! header set to all responses.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use crate::gate::{Gate, GateAction, GateDecision};
use crate::request::RequestContext;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
    script-src 'self' 'unsafe-inline' https://cdn.jsdelivr.net https://unpkg.com https://static.cloudflareinsights.com; \
    style-src 'self' 'unsafe-inline' https://cdn.jsdelivr.net https://fonts.googleapis.com; \
    font-src 'self' https://cdn.jsdelivr.net https://fonts.gstatic.com; \
    img-src 'self' data: https:; \
    connect-src 'self' https://cloudflareinsights.com; \
    media-src 'self'; \
    frame-ancestors 'none'; \
    base-uri 'self'; \
    form-action 'self'; \
    upgrade-insecure-requests";

const PERMISSIONS_POLICY: &str = "accelerometer=(), ambient-light-sensor=(), autoplay=(), \
    battery=(), camera=(), cross-origin-isolated=(), display-capture=(), document-domain=(), \
    encrypted-media=(), execution-while-not-rendered=(), execution-while-out-of-viewport=(), \
    fullscreen=(), geolocation=(), gyroscope=(), keyboard-map=(), magnetometer=(), \
    microphone=(), midi=(), navigation-override=(), payment=(), picture-in-picture=(), \
    publickey-credentials-get=(), screen-wake-lock=(), sync-xhr=(), usb=(), web-share=(), \
    xr-spatial-tracking=()";

/// Admission middleware: classify, rate limit, annotate, record.
pub async fn gate_middleware(
    State(gate): State<Arc<Gate>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let ctx = context_from_request(&request);
    let decision = gate.inspect(&ctx).await;

    match decision.action {
        GateAction::Deny => {
            let response = (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": "Forbidden" })),
            )
                .into_response();
            gate.record(&ctx, &decision, response.status().as_u16(), started.elapsed())
                .await;
            response
        }
        GateAction::Limit { retry_after } => {
            let response = (
                StatusCode::TOO_MANY_REQUESTS,
                [
                    ("Retry-After", retry_after.to_string()),
                    (
                        "X-RateLimit-Limit",
                        decision.limit.unwrap_or_default().to_string(),
                    ),
                    (
                        "X-Bot-Tier",
                        decision.classification.tier.as_str().to_string(),
                    ),
                ],
                Json(serde_json::json!({ "error": "Rate limit exceeded" })),
            )
                .into_response();
            gate.record(&ctx, &decision, response.status().as_u16(), started.elapsed())
                .await;
            response
        }
        GateAction::Pass => {
            let mut response = next.run(request).await;
            annotate_response(&mut response, &decision);
            gate.record(&ctx, &decision, response.status().as_u16(), started.elapsed())
                .await;
            response
        }
    }
}

/// Hardened security headers on every response, with immutable caching
/// for static assets.
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let is_static = request.uri().path().starts_with("/static/");
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("x-xss-protection", HeaderValue::from_static("1; mode=block"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "strict-transport-security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "cross-origin-opener-policy",
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static(CONTENT_SECURITY_POLICY),
    );
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static(PERMISSIONS_POLICY),
    );

    if is_static {
        headers.insert(
            "cache-control",
            HeaderValue::from_static("public, max-age=31536000, immutable"),
        );
        headers.insert(
            "cross-origin-resource-policy",
            HeaderValue::from_static("same-origin"),
        );
    }

    response
}

/// Build the pipeline's request view from the raw parts. The peer
/// address comes from `ConnectInfo` when the server was bound with it.
fn context_from_request(request: &Request) -> RequestContext {
    let mut headers: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in request.headers() {
        if let Ok(value) = value.to_str() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }

    let peer_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]));

    RequestContext::new(
        request.method().as_str(),
        request.uri().path(),
        request.uri().query().unwrap_or(""),
        headers,
        peer_ip,
    )
}

fn annotate_response(response: &mut Response, decision: &GateDecision) {
    if decision.exempt {
        return;
    }

    let tier = decision.classification.tier;
    let headers = response.headers_mut();
    headers.insert("x-bot-tier", HeaderValue::from_static(tier.as_str()));

    if tier.bypasses_rate_limit() {
        headers.insert(
            "x-ratelimit-category",
            HeaderValue::from_static(tier.as_str()),
        );
        return;
    }

    if let Some(limit) = decision.limit {
        headers.insert("x-ratelimit-limit", HeaderValue::from(limit));
    }
    if let Some(rate) = decision.rate {
        headers.insert("x-ratelimit-remaining", HeaderValue::from(rate.remaining));
    }
}
