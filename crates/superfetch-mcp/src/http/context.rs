//! Request context construction and header validation (spec §4.12 stages 1-3).

use axum::http::{HeaderMap, StatusCode};

pub struct RequestContext {
    pub client_ip: String,
    pub host: String,
    pub origin: Option<String>,
}

const SINGLE_VALUE_HEADERS: &[&str] = &[
    "authorization",
    "x-api-key",
    "host",
    "origin",
    "content-length",
    "mcp-session-id",
    "x-mcp-session-id",
];

/// Rejects requests where any of the spec's single-value headers is repeated
/// (spec §4.12 stage 2).
pub fn reject_duplicate_headers(headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    for name in SINGLE_VALUE_HEADERS {
        if headers.get_all(*name).iter().count() > 1 {
            return Err((StatusCode::BAD_REQUEST, format!("duplicate header: {name}")));
        }
    }
    Ok(())
}

/// Extracts the canonical client IP: `X-Forwarded-For` (first hop) then
/// `X-Real-IP`, falling back to `"unknown"` for the rate limiter key.
pub fn client_ip(headers: &HeaderMap, remote: Option<std::net::SocketAddr>) -> String {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real_ip.trim().is_empty() {
            return real_ip.trim().to_string();
        }
    }
    remote
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn build_context(
    headers: &HeaderMap,
    remote: Option<std::net::SocketAddr>,
) -> Result<RequestContext, (StatusCode, String)> {
    reject_duplicate_headers(headers)?;
    let host = headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .ok_or((StatusCode::BAD_REQUEST, "missing Host header".to_string()))?
        .to_string();
    let origin = headers
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    Ok(RequestContext {
        client_ip: client_ip(headers, remote),
        host,
        origin,
    })
}
