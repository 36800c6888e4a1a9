//! MCP Session Gateway over Streamable HTTP (spec §4.11).

pub mod tool;

#[cfg(feature = "stdio")]
pub mod stdio;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::Json as AxumJson;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use superfetch_core::auth::{AuthFingerprint, AuthInfo};
use superfetch_core::session::SessionRecord;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::state::{AppState, FINGERPRINT_KEY};

const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-11-25", "2025-03-26"];
const INIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub id: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    fn err(id: Option<Value>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }
}

struct GatewaySession {
    backlog: Mutex<Vec<(u64, String)>>,
    sender: broadcast::Sender<(u64, String)>,
    next_event_id: AtomicU64,
}

/// Holds the live SSE plumbing for sessions that exist in `AppState::session_store`.
/// The store itself only tracks the durable `SessionRecord`; this registry is the
/// transport-level half of a session (its event backlog and broadcast channel).
pub struct GatewayRegistry {
    sessions: Mutex<HashMap<String, Arc<GatewaySession>>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn create(&self, id: &str) -> Arc<GatewaySession> {
        let (tx, _rx) = broadcast::channel(256);
        let session = Arc::new(GatewaySession {
            backlog: Mutex::new(Vec::new()),
            sender: tx,
            next_event_id: AtomicU64::new(1),
        });
        self.sessions.lock().await.insert(id.to_string(), session.clone());
        session
    }

    pub(crate) async fn get(&self, id: &str) -> Option<Arc<GatewaySession>> {
        self.sessions.lock().await.get(id).cloned()
    }

    pub(crate) async fn remove(&self, id: &str) {
        self.sessions.lock().await.remove(id);
    }
}

impl Default for GatewayRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_protocol_version(headers: &HeaderMap) -> Result<String, (StatusCode, JsonRpcResponse)> {
    match headers.get("mcp-protocol-version").and_then(|v| v.to_str().ok()) {
        None => Ok(SUPPORTED_PROTOCOL_VERSIONS[0].to_string()),
        Some(v) if SUPPORTED_PROTOCOL_VERSIONS.contains(&v) => Ok(v.to_string()),
        Some(v) => Err((
            StatusCode::BAD_REQUEST,
            JsonRpcResponse::err(
                None,
                -32600,
                format!("unsupported protocol version: {v}"),
            ),
        )),
    }
}

fn session_id_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get("mcp-session-id")
        .or_else(|| headers.get("x-mcp-session-id"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn token_from_headers(headers: &HeaderMap, accepts_x_api_key: bool) -> Option<String> {
    if let Some(bearer) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(bearer.to_string());
    }
    if accepts_x_api_key {
        if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
            return Some(key.to_string());
        }
    }
    None
}

/// A failed credential check, carrying enough information for either the
/// JSON-RPC gateway or a plain HTTP route (like the download route) to
/// render its own error shape.
pub(crate) struct AuthFailure {
    pub status: StatusCode,
    pub message: String,
    pub jsonrpc_code: i64,
}

/// Verifies the inbound credential against `state.auth`, if configured, and
/// returns the resulting `AuthFingerprint`. Anonymous access (no `auth`
/// backend configured) fingerprints the empty credential so sessions are
/// still bound to "no auth" consistently.
pub(crate) async fn verify_credential(
    state: &Arc<AppState>,
    headers: &HeaderMap,
) -> Result<AuthFingerprint, AuthFailure> {
    let Some(auth) = &state.auth else {
        let anonymous = AuthInfo {
            token: String::new(),
            client_id: "anonymous".to_string(),
            scopes: vec![],
            expires_at: None,
            resource: None,
        };
        return Ok(superfetch_local::auth_service::fingerprint(FINGERPRINT_KEY, &anonymous));
    };

    let Some(token) = token_from_headers(headers, auth.accepts_x_api_key()) else {
        return Err(AuthFailure {
            status: StatusCode::UNAUTHORIZED,
            message: "missing credential".to_string(),
            jsonrpc_code: -32603,
        });
    };

    match auth.verify(&token, None).await {
        Ok(info) => Ok(superfetch_local::auth_service::fingerprint(FINGERPRINT_KEY, &info)),
        Err(e) => Err(AuthFailure {
            status: StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::UNAUTHORIZED),
            message: e.message(),
            jsonrpc_code: e.jsonrpc_code(),
        }),
    }
}

async fn authenticate(
    state: &Arc<AppState>,
    headers: &HeaderMap,
) -> Result<AuthFingerprint, (StatusCode, JsonRpcResponse)> {
    verify_credential(state, headers)
        .await
        .map_err(|f| (f.status, JsonRpcResponse::err(None, f.jsonrpc_code, f.message)))
}

pub async fn handle_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumJson(body): AxumJson<Value>,
) -> Response {
    let protocol_version = match extract_protocol_version(&headers) {
        Ok(v) => v,
        Err((status, resp)) => return (status, Json(resp)).into_response(),
    };

    let request: JsonRpcRequest = match serde_json::from_value(body.clone()) {
        Ok(r) => r,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::err(None, -32700, "Parse error")),
            )
                .into_response();
        }
    };
    if request.jsonrpc != "2.0" {
        return (
            StatusCode::BAD_REQUEST,
            Json(JsonRpcResponse::err(request.id, -32600, "invalid jsonrpc version")),
        )
            .into_response();
    }

    let fingerprint = match authenticate(&state, &headers).await {
        Ok(f) => f,
        Err((status, resp)) => return (status, Json(resp)).into_response(),
    };
    let session_id = session_id_header(&headers);

    match session_id {
        Some(id) => {
            let Some(record) = state.session_store.get(&id) else {
                return (
                    StatusCode::NOT_FOUND,
                    Json(JsonRpcResponse::err(request.id, -32600, "Session not found")),
                )
                    .into_response();
            };
            if record.auth_fingerprint != fingerprint {
                return (
                    StatusCode::NOT_FOUND,
                    Json(JsonRpcResponse::err(request.id, -32600, "Session not found")),
                )
                    .into_response();
            }
            state.session_store.touch(&id, now_ms());
            dispatch(&state, &id, request).await
        }
        None if request.method == "initialize" => {
            create_session(&state, &protocol_version, fingerprint, request).await
        }
        None => (
            StatusCode::BAD_REQUEST,
            Json(JsonRpcResponse::err(request.id, -32600, "Missing session ID")),
        )
            .into_response(),
    }
}

async fn create_session(
    state: &Arc<AppState>,
    protocol_version: &str,
    fingerprint: AuthFingerprint,
    request: JsonRpcRequest,
) -> Response {
    if state.session_store.reserve_slot().is_err() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(JsonRpcResponse::err(request.id, -32000, "server busy")),
        )
            .into_response();
    }

    let id = Uuid::new_v4().to_string();
    let init_result = tokio::time::timeout(INIT_TIMEOUT, async {
        state.registry.create(&id).await;
        Ok::<(), ()>(())
    })
    .await;

    if init_result.is_err() {
        state.session_store.release_slot();
        state.registry.remove(&id).await;
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(JsonRpcResponse::err(request.id, -32000, "session initialization timed out")),
        )
            .into_response();
    }

    let now = now_ms();
    state.session_store.set(SessionRecord {
        id: id.clone(),
        auth_fingerprint: fingerprint,
        created_at_ms: now,
        last_seen_ms: now,
        protocol_version: protocol_version.to_string(),
        protocol_initialized: true,
    });
    state.session_store.release_slot();

    let body = json!({
        "protocolVersion": protocol_version,
        "serverInfo": { "name": "superfetch", "version": env!("CARGO_PKG_VERSION") },
        "capabilities": { "tools": {} },
    });

    let mut response = (
        StatusCode::OK,
        Json(JsonRpcResponse::ok(request.id, body)),
    )
        .into_response();
    if let Ok(v) = id.parse::<axum::http::HeaderValue>().or_else(|_| axum::http::HeaderValue::from_str(&id)) {
        response.headers_mut().insert("mcp-session-id", v);
    }
    response
}

async fn dispatch(state: &Arc<AppState>, session_id: &str, request: JsonRpcRequest) -> Response {
    match request.method.as_str() {
        "tools/call" => {
            let tool_name = request.params.get("name").and_then(|v| v.as_str()).unwrap_or("");
            if tool_name != "fetch-url" {
                return (
                    StatusCode::OK,
                    Json(JsonRpcResponse::err(request.id, -32601, "unknown tool")),
                )
                    .into_response();
            }
            let args = request.params.get("arguments").cloned().unwrap_or(Value::Null);
            let input: tool::FetchUrlInput = match serde_json::from_value(args) {
                Ok(i) => i,
                Err(e) => {
                    return (
                        StatusCode::OK,
                        Json(JsonRpcResponse::err(request.id, -32602, format!("invalid arguments: {e}"))),
                    )
                        .into_response();
                }
            };
            let (structured_content, is_error, resource_link) = tool::run(state, input).await;
            let mut result = json!({
                "structuredContent": structured_content,
                "isError": is_error,
            });
            if let Some(link) = resource_link {
                result["resource_link"] = json!(link);
            }
            publish_event(state, session_id, "tools/call/result", &result).await;
            (StatusCode::OK, Json(JsonRpcResponse::ok(request.id, result))).into_response()
        }
        "tools/list" => {
            let result = json!({
                "tools": [{
                    "name": "fetch-url",
                    "description": "Fetch a single public web page and return LLM-ready Markdown.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "url": { "type": "string" },
                            "skipNoiseRemoval": { "type": "boolean" },
                            "forceRefresh": { "type": "boolean" },
                            "maxInlineChars": { "type": "integer" }
                        },
                        "required": ["url"]
                    }
                }]
            });
            (StatusCode::OK, Json(JsonRpcResponse::ok(request.id, result))).into_response()
        }
        other => (
            StatusCode::OK,
            Json(JsonRpcResponse::err(request.id, -32601, format!("unknown method: {other}"))),
        )
            .into_response(),
    }
}

async fn publish_event(state: &Arc<AppState>, session_id: &str, event: &str, payload: &Value) {
    let Some(session) = state.registry.get(session_id).await else {
        return;
    };
    let event_id = session.next_event_id.fetch_add(1, Ordering::SeqCst);
    let data = json!({ "event": event, "data": payload }).to_string();
    session.backlog.lock().await.push((event_id, data.clone()));
    let _ = session.sender.send((event_id, data));
}

pub async fn handle_get(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .map(|v| !v.contains("text/event-stream"))
        .unwrap_or(true)
    {
        return (StatusCode::NOT_ACCEPTABLE, "Accept must include text/event-stream").into_response();
    }
    let Some(session_id) = session_id_header(&headers) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(JsonRpcResponse::err(None, -32600, "Missing session ID")),
        )
            .into_response();
    };
    let fingerprint = match authenticate(&state, &headers).await {
        Ok(f) => f,
        Err((status, resp)) => return (status, Json(resp)).into_response(),
    };
    match state.session_store.get(&session_id) {
        Some(record) if record.auth_fingerprint == fingerprint => {}
        _ => {
            return (
                StatusCode::NOT_FOUND,
                Json(JsonRpcResponse::err(None, -32600, "Session not found")),
            )
                .into_response();
        }
    }
    let Some(session) = state.registry.get(&session_id).await else {
        return (StatusCode::NOT_FOUND, "unknown session transport").into_response();
    };

    let last_event_id: u64 = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let backlog: Vec<(u64, String)> = session
        .backlog
        .lock()
        .await
        .iter()
        .filter(|(id, _)| *id > last_event_id)
        .cloned()
        .collect();
    let mut rx = session.sender.subscribe();

    let stream = async_stream::stream! {
        for (id, data) in backlog {
            yield Ok::<Event, std::convert::Infallible>(Event::default().id(id.to_string()).data(data));
        }
        loop {
            match rx.recv().await {
                Ok((id, data)) => yield Ok(Event::default().id(id.to_string()).data(data)),
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

pub async fn handle_delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if let Some(session_id) = session_id_header(&headers) {
        let fingerprint = authenticate(&state, &headers).await.ok();
        let owns_session = state
            .session_store
            .get(&session_id)
            .zip(fingerprint)
            .is_some_and(|(record, fp)| record.auth_fingerprint == fp);
        if owns_session {
            state.session_store.remove(&session_id);
            state.registry.remove(&session_id).await;
        }
    }
    // Per spec, DELETE always returns 200 regardless of whether a session
    // existed or was owned by the caller, to avoid leaking session presence.
    StatusCode::OK.into_response()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
