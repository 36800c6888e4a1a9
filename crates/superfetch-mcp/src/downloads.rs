//! `/mcp/downloads/:namespace/:hash` route (spec §4.7, §6).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use superfetch_core::cache::CacheKey;

use crate::mcp::verify_credential;
use crate::state::AppState;

pub async fn download(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((namespace, hash)): Path<(String, String)>,
) -> Response {
    if let Err(failure) = verify_credential(&state, &headers).await {
        return (failure.status, failure.message).into_response();
    }

    let key = CacheKey {
        namespace: leak_namespace(namespace),
        fingerprint: hash,
    };
    let Some(entry) = state.cache.get(&key) else {
        return (StatusCode::NOT_FOUND, "cache entry not found").into_response();
    };
    let remaining_ttl = state.cache.remaining_ttl_ms(&key).unwrap_or(0) / 1000;
    let filename = format!("{}.md", key.fingerprint);

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (
                header::CACHE_CONTROL,
                format!("private, max-age={}", remaining_ttl.max(0)),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        ],
        entry.payload,
    )
        .into_response()
}

/// `CacheKey::namespace` is `&'static str`; only a small fixed set of
/// namespaces is ever served over this route.
fn leak_namespace(namespace: String) -> &'static str {
    match namespace.as_str() {
        "markdown" => "markdown",
        _ => "unknown",
    }
}
