//! CORS header policy (spec §4.12 stage 4).

use axum::http::{HeaderMap, HeaderValue};

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS, DELETE";
const ALLOWED_HEADERS: &str = "Authorization, X-API-Key, Content-Type, MCP-Protocol-Version, MCP-Session-ID, X-MCP-Session-ID, Last-Event-ID, X-Request-Id";

/// Applies `Access-Control-Allow-*` and `Vary: Origin` to `headers` based on
/// the inbound `Origin` header, if any.
pub fn apply(headers: &mut HeaderMap, origin: Option<&str>) {
    let allow_origin = origin.unwrap_or("*");
    if let Ok(v) = HeaderValue::from_str(allow_origin) {
        headers.insert("access-control-allow-origin", v);
    }
    headers.insert("vary", HeaderValue::from_static("Origin"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
}
