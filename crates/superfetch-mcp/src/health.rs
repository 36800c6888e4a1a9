//! `/health` route (spec §6).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HealthQuery {
    #[serde(default)]
    verbose: bool,
}

pub async fn health(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HealthQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !query.verbose {
        return Json(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        }));
    }

    let loopback_bound = state.config.host == "127.0.0.1" || state.config.host == "localhost";

    if !loopback_bound {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some();
        if !authorized {
            return Json(json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
            }));
        }
    }

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.uptime_secs(),
        "sessions": state.session_store.size(),
        "workerPool": {
            "occupancy": state.worker_pool.occupancy(),
            "queueDepth": state.worker_pool.queue_depth(),
        },
        "cacheSize": state.cache.len(),
    }))
}
