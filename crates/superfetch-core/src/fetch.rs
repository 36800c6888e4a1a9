//! Outbound fetch request/response types (spec §4.3).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Wall-clock end-to-end timeout; spec default is 15s.
    pub timeout_ms: u64,
    /// Decoded-body size cap; spec default is 10 MiB.
    pub max_bytes: u64,
    pub max_redirects: u8,
    pub user_agent: String,
}

impl FetchRequest {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub requested_url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub bytes: Vec<u8>,
    pub truncated: bool,
    pub redirect_hops: u8,
}

impl FetchResponse {
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).to_string()
    }
}
