//! Rate limit entry (spec §3 "Rate Limit Entry", §4.8).

#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_time_ms: i64,
    pub last_accessed_ms: i64,
}

impl RateLimitEntry {
    pub fn fresh(now_ms: i64, window_ms: i64) -> Self {
        Self {
            count: 1,
            reset_time_ms: now_ms + window_ms,
            last_accessed_ms: now_ms,
        }
    }

    pub fn is_idle(&self, now_ms: i64, window_ms: i64) -> bool {
        now_ms - self.last_accessed_ms > 2 * window_ms
    }
}
