//! Content-addressed cache with LRU eviction, TTL and subscription events
//! (spec §4.7).

use std::collections::HashMap;
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use superfetch_core::cache::{CacheEntry, CacheEvent, CacheKey};
use tokio::sync::broadcast;

const MAX_ENTRIES: usize = 100;
const DEFAULT_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

struct Slot {
    entry: CacheEntry,
    ttl_ms: i64,
}

struct Inner {
    entries: HashMap<CacheKey, Slot>,
    /// Keys ordered from least- to most-recently-seen, for O(n) LRU eviction.
    /// `MAX_ENTRIES` is small (100) so a linear scan is simpler than a second
    /// index and still fast in practice.
    order: Vec<CacheKey>,
}

pub struct ContentCache {
    inner: Mutex<Inner>,
    events: broadcast::Sender<CacheEvent>,
}

impl ContentCache {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: Vec::new(),
            }),
            events: tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Current entry count, for `/health?verbose=1` occupancy reporting.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Derives the stable fingerprint for a canonicalized URL + transform
    /// options tuple (spec §4.7 key derivation).
    pub fn fingerprint(canonical_url: &str, options_digest: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(canonical_url.as_bytes());
        hasher.update(b"\0");
        hasher.update(options_digest.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = now_ms();
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        if let Some(slot) = inner.entries.get(key) {
            if now - slot.entry.created_at_ms > slot.ttl_ms {
                inner.entries.remove(key);
                inner.order.retain(|k| k != key);
                self.emit(CacheEvent::Deleted(key.clone()));
                return None;
            }
        } else {
            return None;
        }
        let slot = inner.entries.get_mut(key).expect("checked above");
        slot.entry.last_seen_ms = now;
        inner.order.retain(|k| k != key);
        inner.order.push(key.clone());
        inner.entries.get(key).map(|s| s.entry.clone())
    }

    pub fn insert(&self, key: CacheKey, payload: Vec<u8>, mime: String) {
        let now = now_ms();
        let size = payload.len();
        let entry = CacheEntry {
            key: key.clone(),
            payload,
            mime,
            size,
            created_at_ms: now,
            last_seen_ms: now,
        };
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let is_update = inner.entries.contains_key(&key);
        inner.entries.insert(
            key.clone(),
            Slot {
                entry,
                ttl_ms: DEFAULT_TTL_MS,
            },
        );
        inner.order.retain(|k| k != &key);
        inner.order.push(key.clone());

        while inner.entries.len() > MAX_ENTRIES {
            if let Some(lru_key) = inner.order.first().cloned() {
                inner.order.remove(0);
                inner.entries.remove(&lru_key);
                drop(inner);
                self.emit(CacheEvent::Deleted(lru_key));
                inner = self.inner.lock().expect("cache mutex poisoned");
            } else {
                break;
            }
        }
        drop(inner);

        self.emit(if is_update {
            CacheEvent::Updated(key)
        } else {
            CacheEvent::Inserted(key)
        });
    }

    /// Lazily purges TTL-expired entries; intended to be called by a
    /// periodic sweep task in addition to the lazy check in `get`.
    pub fn sweep_expired(&self) {
        let now = now_ms();
        let expired: Vec<CacheKey> = {
            let inner = self.inner.lock().expect("cache mutex poisoned");
            inner
                .entries
                .iter()
                .filter(|(_, slot)| now - slot.entry.created_at_ms > slot.ttl_ms)
                .map(|(k, _)| k.clone())
                .collect()
        };
        for key in expired {
            let mut inner = self.inner.lock().expect("cache mutex poisoned");
            inner.entries.remove(&key);
            inner.order.retain(|k| k != &key);
            drop(inner);
            self.emit(CacheEvent::Deleted(key));
        }
    }

    pub fn remaining_ttl_ms(&self, key: &CacheKey) -> Option<i64> {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        inner
            .entries
            .get(key)
            .map(|slot| (slot.ttl_ms - (now_ms() - slot.entry.created_at_ms)).max(0))
    }

    fn emit(&self, event: CacheEvent) {
        let _ = self.events.send(event);
    }
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new()
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let cache = ContentCache::new();
        let key = CacheKey::markdown("abc".to_string());
        cache.insert(key.clone(), b"hello".to_vec(), "text/markdown".to_string());
        let entry = cache.get(&key).expect("entry present");
        assert_eq!(entry.payload, b"hello");
    }

    #[test]
    fn eviction_emits_deleted_event_at_capacity() {
        let cache = ContentCache::new();
        let mut rx = cache.subscribe();
        for i in 0..MAX_ENTRIES + 1 {
            let key = CacheKey::markdown(format!("key-{i}"));
            cache.insert(key, vec![0u8; 1], "text/markdown".to_string());
        }
        let mut saw_delete = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, CacheEvent::Deleted(_)) {
                saw_delete = true;
            }
        }
        assert!(saw_delete);
    }

    #[test]
    fn fingerprint_is_stable_for_same_inputs() {
        let a = ContentCache::fingerprint("https://example.com/", "opts-v1");
        let b = ContentCache::fingerprint("https://example.com/", "opts-v1");
        assert_eq!(a, b);
    }
}
