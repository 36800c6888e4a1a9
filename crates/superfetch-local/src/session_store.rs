//! In-memory session store with TTL, LRU eviction and admission slots
//! (spec §4.10, §4.11).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use superfetch_core::session::SessionRecord;
use superfetch_core::Error;

pub struct SessionStoreConfig {
    pub max_sessions: usize,
    pub ttl_ms: i64,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            ttl_ms: 30 * 60 * 1000,
        }
    }
}

struct Inner {
    records: HashMap<String, SessionRecord>,
    /// Insertion/touch order, oldest first, for `evict_oldest`.
    order: Vec<String>,
}

/// Tracks sessions plus an admission counter that is reserved before a
/// session exists and released exactly once regardless of outcome (spec
/// §4.11 "Session creation flow").
pub struct SessionStore {
    config: SessionStoreConfig,
    inner: Mutex<Inner>,
    in_flight: AtomicUsize,
}

impl SessionStore {
    pub fn new(config: SessionStoreConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                records: HashMap::new(),
                order: Vec::new(),
            }),
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Step (1)+(2) of session creation admission: evict the oldest record if
    /// at capacity, then reserve an in-flight slot under the same cap.
    pub fn reserve_slot(&self) -> Result<(), Error> {
        loop {
            let current = self.in_flight.load(Ordering::SeqCst);
            let occupied = current + self.size();
            if occupied < self.config.max_sessions {
                if self
                    .in_flight
                    .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    return Ok(());
                }
                continue;
            }
            if self.evict_oldest().is_none() {
                return Err(Error::ServerBusy(
                    "session store at capacity".to_string(),
                ));
            }
        }
    }

    /// Releases a reserved slot exactly once; call on every admission exit
    /// path (success or failure).
    pub fn release_slot(&self) {
        self.in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            })
            .ok();
    }

    pub fn get(&self, id: &str) -> Option<SessionRecord> {
        let inner = self.inner.lock().expect("session store mutex poisoned");
        inner.records.get(id).cloned()
    }

    pub fn set(&self, record: SessionRecord) {
        let mut inner = self.inner.lock().expect("session store mutex poisoned");
        let id = record.id.clone();
        inner.order.retain(|k| k != &id);
        inner.order.push(id.clone());
        inner.records.insert(id, record);
    }

    pub fn touch(&self, id: &str, now_ms: i64) {
        let mut inner = self.inner.lock().expect("session store mutex poisoned");
        if let Some(record) = inner.records.get_mut(id) {
            record.last_seen_ms = now_ms;
        }
        inner.order.retain(|k| k != id);
        inner.order.push(id.to_string());
    }

    pub fn remove(&self, id: &str) -> Option<SessionRecord> {
        let mut inner = self.inner.lock().expect("session store mutex poisoned");
        inner.order.retain(|k| k != id);
        inner.records.remove(id)
    }

    pub fn evict_oldest(&self) -> Option<SessionRecord> {
        let mut inner = self.inner.lock().expect("session store mutex poisoned");
        let oldest = inner.order.first().cloned()?;
        inner.order.remove(0);
        inner.records.remove(&oldest)
    }

    pub fn evict_expired(&self, now_ms: i64) -> Vec<SessionRecord> {
        let mut inner = self.inner.lock().expect("session store mutex poisoned");
        let expired_ids: Vec<String> = inner
            .records
            .iter()
            .filter(|(_, rec)| rec.is_expired(now_ms, self.config.ttl_ms))
            .map(|(id, _)| id.clone())
            .collect();
        let mut out = Vec::with_capacity(expired_ids.len());
        for id in expired_ids {
            inner.order.retain(|k| k != &id);
            if let Some(rec) = inner.records.remove(&id) {
                out.push(rec);
            }
        }
        out
    }

    pub fn clear(&self) -> Vec<SessionRecord> {
        let mut inner = self.inner.lock().expect("session store mutex poisoned");
        inner.order.clear();
        inner.records.drain().map(|(_, v)| v).collect()
    }

    pub fn size(&self) -> usize {
        let inner = self.inner.lock().expect("session store mutex poisoned");
        inner.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use superfetch_core::auth::AuthFingerprint;

    fn sample_record(id: &str) -> SessionRecord {
        SessionRecord {
            id: id.to_string(),
            auth_fingerprint: AuthFingerprint("fp".to_string()),
            created_at_ms: 0,
            last_seen_ms: 0,
            protocol_version: "2025-06-18".to_string(),
            protocol_initialized: true,
        }
    }

    #[test]
    fn evict_oldest_returns_first_inserted() {
        let store = SessionStore::new(SessionStoreConfig::default());
        store.set(sample_record("a"));
        store.set(sample_record("b"));
        let evicted = store.evict_oldest().unwrap();
        assert_eq!(evicted.id, "a");
    }

    #[test]
    fn evict_expired_removes_only_stale_records() {
        let store = SessionStore::new(SessionStoreConfig {
            max_sessions: 1000,
            ttl_ms: 1000,
        });
        store.set(sample_record("fresh"));
        let mut stale = sample_record("stale");
        stale.last_seen_ms = -10_000;
        store.set(stale);
        let expired = store.evict_expired(0);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "stale");
        assert!(store.get("fresh").is_some());
    }

    #[test]
    fn release_slot_is_idempotent_safe_at_zero() {
        let store = SessionStore::new(SessionStoreConfig::default());
        store.release_slot();
        assert_eq!(store.in_flight.load(Ordering::SeqCst), 0);
    }
}
