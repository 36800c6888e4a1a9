//! MCP session record (spec §3 "Session Record", §4.10).

use crate::auth::AuthFingerprint;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub id: String,
    pub auth_fingerprint: AuthFingerprint,
    pub created_at_ms: i64,
    pub last_seen_ms: i64,
    pub protocol_version: String,
    pub protocol_initialized: bool,
}

impl SessionRecord {
    pub fn is_expired(&self, now_ms: i64, ttl_ms: i64) -> bool {
        self.last_seen_ms < now_ms - ttl_ms
    }
}
