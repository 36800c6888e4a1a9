//! Fixed-window per-key rate limiter (spec §4.8).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use superfetch_core::rate_limit::RateLimitEntry;

pub struct RateLimiterConfig {
    pub max_requests: u32,
    pub window_ms: i64,
    pub cleanup_interval_ms: i64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_ms: 60_000,
            cleanup_interval_ms: 60_000,
        }
    }
}

pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after_secs: u64,
}

/// Fixed-window counter keyed by client IP (or the literal `"unknown"`).
/// Deliberately hand-rolled rather than built on a token-bucket crate: the
/// spec's `{count, resetTime, lastAccessed}` fields and the idle-eviction
/// rule are part of the observable contract.
pub struct RateLimiter {
    config: RateLimiterConfig,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Applies the fixed-window algorithm for `key`. Callers are expected to
    /// exempt OPTIONS requests before calling this.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = now_ms();
        let mut entries = self.entries.lock().expect("rate limiter mutex poisoned");

        let needs_fresh = match entries.get(key) {
            None => true,
            Some(entry) => now > entry.reset_time_ms,
        };
        if needs_fresh {
            entries.insert(
                key.to_string(),
                RateLimitEntry::fresh(now, self.config.window_ms),
            );
        } else if let Some(entry) = entries.get_mut(key) {
            entry.count += 1;
            entry.last_accessed_ms = now;
        }
        let entry = entries.get(key).expect("just inserted or updated");

        if entry.count > self.config.max_requests {
            let retry_after_ms = (entry.reset_time_ms - now).max(1000);
            let retry_after_secs = retry_after_ms.div_euclid(1000).max(1) as u64;
            return RateLimitDecision {
                allowed: false,
                retry_after_secs,
            };
        }

        RateLimitDecision {
            allowed: true,
            retry_after_secs: 0,
        }
    }

    /// Evicts entries idle for more than `2 * window_ms`; intended to run on
    /// a `cleanup_interval_ms` cadence via a background task.
    pub fn sweep(&self) {
        let now = now_ms();
        let mut entries = self.entries.lock().expect("rate limiter mutex poisoned");
        entries.retain(|_, entry| !entry.is_idle(now, self.config.window_ms));
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.config.cleanup_interval_ms.max(0) as u64)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_max_requests() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 3,
            window_ms: 60_000,
            cleanup_interval_ms: 60_000,
        });
        for _ in 0..3 {
            assert!(limiter.check("1.2.3.4").allowed);
        }
        assert!(!limiter.check("1.2.3.4").allowed);
    }

    #[test]
    fn separate_keys_have_independent_windows() {
        let limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 1,
            window_ms: 60_000,
            cleanup_interval_ms: 60_000,
        });
        assert!(limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
        assert!(!limiter.check("a").allowed);
    }
}
