//! Process-wide shared state, initialized once at server start (spec §5
//! "Process-wide state").

use std::sync::Arc;
use std::time::Instant;

use superfetch_local::auth_service::AuthService;
use superfetch_local::cache::ContentCache;
use superfetch_local::fetcher::Fetcher;
use superfetch_local::rate_limiter::{RateLimiter, RateLimiterConfig};
use superfetch_local::session_store::{SessionStore, SessionStoreConfig};
use superfetch_local::worker_pool::{WorkerPool, WorkerPoolConfig};

use crate::config::Config;
use crate::mcp::GatewayRegistry;

/// Fixed key used to derive session auth fingerprints from `clientId:token`.
/// Distinct from the static-token digest key below so that a leaked
/// fingerprint cannot be replayed as a token digest or vice versa.
pub const FINGERPRINT_KEY: &[u8] = b"superfetch-session-fingerprint-v1";

/// Fixed key used to digest configured static tokens. `AuthService` stores
/// whatever key it's given alongside the digests derived from it, so this
/// only needs to be distinct from `FINGERPRINT_KEY`, not secret itself.
pub const STATIC_TOKEN_KEY: &[u8] = b"superfetch-static-token-hmac-v1";

pub struct AppState {
    pub config: Config,
    pub fetcher: Fetcher,
    pub worker_pool: Arc<WorkerPool>,
    pub cache: Arc<ContentCache>,
    pub rate_limiter: Arc<RateLimiter>,
    pub session_store: Arc<SessionStore>,
    pub auth: Option<AuthService>,
    pub registry: GatewayRegistry,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let auth = match config.auth_mode {
            crate::config::AuthMode::Static => {
                if config.access_tokens.is_empty() {
                    None
                } else {
                    Some(AuthService::static_tokens(
                        &config.access_tokens,
                        STATIC_TOKEN_KEY,
                        vec![],
                    ))
                }
            }
            crate::config::AuthMode::OAuth => config.oauth_introspection_url.clone().map(|url| {
                AuthService::oauth_introspection(
                    url,
                    None,
                    None,
                    std::time::Duration::from_secs(5),
                )
            }),
        };

        Ok(Arc::new(Self {
            fetcher: Fetcher::new().map_err(|e| anyhow::anyhow!(e.message()))?,
            worker_pool: WorkerPool::new(WorkerPoolConfig::from_available_parallelism()),
            cache: Arc::new(ContentCache::new()),
            rate_limiter: Arc::new(RateLimiter::new(RateLimiterConfig {
                max_requests: config.max_requests_per_window,
                window_ms: config.rate_limit_window_ms,
                cleanup_interval_ms: 60_000,
            })),
            session_store: Arc::new(SessionStore::new(SessionStoreConfig {
                max_sessions: config.max_sessions,
                ttl_ms: 30 * 60 * 1000,
            })),
            auth,
            registry: GatewayRegistry::new(),
            started_at: Instant::now(),
            config,
        }))
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
