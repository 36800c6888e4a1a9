//! The HTTP request pipeline (spec §4.12): shared plumbing used by every
//! route, ahead of the MCP session gateway and download route.

pub mod context;
pub mod cors;

use axum::http::StatusCode;
use url::Url;

use crate::config::Config;
use context::RequestContext;

/// Stage 3: Host/Origin policy. Host must resolve against the allow set;
/// Origin, when present, must parse and its host must also be allowed.
pub fn enforce_host_origin(config: &Config, ctx: &RequestContext) -> Result<(), (StatusCode, String)> {
    if !config.is_host_allowed(&ctx.host) {
        return Err((StatusCode::FORBIDDEN, "host not allowed".to_string()));
    }
    if let Some(origin) = &ctx.origin {
        let parsed = Url::parse(origin)
            .map_err(|_| (StatusCode::BAD_REQUEST, "invalid Origin header".to_string()))?;
        let origin_host = parsed
            .host_str()
            .ok_or((StatusCode::BAD_REQUEST, "invalid Origin header".to_string()))?;
        if !config.is_host_allowed(origin_host) {
            return Err((StatusCode::FORBIDDEN, "origin not allowed".to_string()));
        }
    }
    Ok(())
}
