//! Error taxonomy (spec §7) shared by every superFetch component.
//!
//! Each variant knows its own HTTP status and, where applicable, its JSON-RPC
//! error code, so the edges (HTTP pipeline, MCP gateway, tool handler) never have
//! to re-derive the mapping.

use serde::Serialize;

#[derive(thiserror::Error, Debug, Clone, Serialize)]
#[serde(tag = "code", content = "message")]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("blocked host: {0}")]
    BlockedHost(String),
    #[error("blocked redirect: {0}")]
    BlockedRedirect(String),
    #[error("response too large: {0}")]
    ResponseTooLarge(String),
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("fetch timeout: {0}")]
    FetchTimeout(String),
    #[error("fetch network error: {0}")]
    FetchNetwork(String),
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("server busy: {0}")]
    ServerBusy(String),
    #[error("queue full: {0}")]
    QueueFull(String),
    #[error("worker timeout: {0}")]
    WorkerTimeout(String),
    #[error("worker broken: {0}")]
    WorkerBroken(String),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("unsupported protocol version: {0}")]
    ProtocolVersionUnsupported(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("canceled: {0}")]
    Canceled(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable taxonomy tag, e.g. `"blocked_host"`. Matches spec §7 names exactly.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidUrl(_) => "invalid_url",
            Error::BlockedHost(_) => "blocked_host",
            Error::BlockedRedirect(_) => "blocked_redirect",
            Error::ResponseTooLarge(_) => "response_too_large",
            Error::UnsupportedMediaType(_) => "unsupported_media_type",
            Error::FetchTimeout(_) => "fetch_timeout",
            Error::FetchNetwork(_) => "fetch_network",
            Error::InvalidToken(_) => "invalid_token",
            Error::Unauthorized(_) => "unauthorized",
            Error::RateLimited(_) => "rate_limited",
            Error::ServerBusy(_) => "server_busy",
            Error::QueueFull(_) => "queue_full",
            Error::WorkerTimeout(_) => "worker_timeout",
            Error::WorkerBroken(_) => "worker_broken",
            Error::ParseError(_) => "parse_error",
            Error::ProtocolVersionUnsupported(_) => "protocol_version_unsupported",
            Error::SessionNotFound(_) => "session_not_found",
            Error::Internal(_) => "internal",
            Error::Canceled(_) => "canceled",
        }
    }

    /// HTTP status per spec §7 propagation table.
    ///
    /// `fetch_network` has no explicit status in the spec table; it is treated as
    /// an upstream failure (502), distinct from our own timeout/size/media-type
    /// rejections.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidUrl(_)
            | Error::BlockedHost(_)
            | Error::BlockedRedirect(_)
            | Error::UnsupportedMediaType(_)
            | Error::ParseError(_)
            | Error::ProtocolVersionUnsupported(_) => 400,
            Error::InvalidToken(_) | Error::Unauthorized(_) => 401,
            Error::SessionNotFound(_) => 404,
            Error::ResponseTooLarge(_) => 413,
            Error::RateLimited(_) => 429,
            Error::FetchTimeout(_) | Error::WorkerTimeout(_) => 504,
            Error::FetchNetwork(_) => 502,
            Error::Internal(_) | Error::WorkerBroken(_) | Error::ServerBusy(_) | Error::QueueFull(_) => 503,
            // 499 (client closed request) per the nginx convention; there is no
            // standard status for "the client went away before we finished".
            Error::Canceled(_) => 499,
        }
    }

    /// JSON-RPC error code (spec §6) for errors that surface at the protocol
    /// layer rather than as `fetch-url` tool output.
    pub fn jsonrpc_code(&self) -> i64 {
        match self {
            Error::ParseError(_) => -32700,
            Error::ProtocolVersionUnsupported(_) | Error::SessionNotFound(_) => -32600,
            Error::ServerBusy(_) | Error::QueueFull(_) => -32000,
            _ => -32603,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}
