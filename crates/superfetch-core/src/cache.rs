//! Content cache entry/key types (spec §3 "Content Cache Entry", §4.7).

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub namespace: &'static str,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn markdown(fingerprint: String) -> Self {
        Self {
            namespace: "markdown",
            fingerprint,
        }
    }

    pub fn resource_uri(&self) -> String {
        format!("superfetch://cache/{}/{}", self.namespace, self.fingerprint)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub payload: Vec<u8>,
    pub mime: String,
    pub size: usize,
    pub created_at_ms: i64,
    pub last_seen_ms: i64,
}

/// Subscription event emitted on cache mutation (spec §3 "Content Cache Entry").
#[derive(Debug, Clone, Serialize)]
pub enum CacheEvent {
    Inserted(CacheKey),
    Updated(CacheKey),
    Deleted(CacheKey),
}
