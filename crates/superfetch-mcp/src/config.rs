//! Environment-driven configuration (spec §6 "names are contracts").

use std::net::IpAddr;

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_csv(key: &str) -> Vec<String> {
    env(key)
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Static,
    OAuth,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub allow_remote: bool,
    pub allowed_hosts: Vec<String>,
    pub auth_mode: AuthMode,
    pub access_tokens: Vec<String>,
    pub api_key: Option<String>,
    pub oauth_introspection_url: Option<String>,
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    pub transform_timeout_ms: u64,
    pub user_agent: String,
    pub log_level: String,
    pub max_sessions: usize,
    pub max_requests_per_window: u32,
    pub rate_limit_window_ms: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = env("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = env("PORT")
            .map(|p| p.parse::<u16>())
            .transpose()?
            .unwrap_or(8089);
        let allow_remote = env("ALLOW_REMOTE")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let auth_mode = match env("AUTH_MODE").as_deref() {
            Some("oauth") => AuthMode::OAuth,
            _ => AuthMode::Static,
        };

        if allow_remote && !is_loopback(&host) && auth_mode != AuthMode::OAuth {
            anyhow::bail!("binding to a non-loopback host requires ALLOW_REMOTE=true and AUTH_MODE=oauth");
        }

        Ok(Self {
            host,
            port,
            allow_remote,
            allowed_hosts: env_csv("ALLOWED_HOSTS"),
            auth_mode,
            access_tokens: env_csv("ACCESS_TOKENS"),
            api_key: env("API_KEY"),
            oauth_introspection_url: env("OAUTH_INTROSPECTION_URL"),
            cache_enabled: env("CACHE_ENABLED").map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(true),
            cache_ttl_secs: env("CACHE_TTL").and_then(|v| v.parse().ok()).unwrap_or(7 * 24 * 3600),
            transform_timeout_ms: env("TRANSFORM_TIMEOUT_MS").and_then(|v| v.parse().ok()).unwrap_or(30_000),
            user_agent: env("USER_AGENT").unwrap_or_else(|| "superfetch/0.1 (+https://github.com/superfetch-mcp/superfetch)".to_string()),
            log_level: env("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            max_sessions: env("MAX_SESSIONS").and_then(|v| v.parse().ok()).unwrap_or(1000),
            max_requests_per_window: env("MAX_REQUESTS_PER_WINDOW").and_then(|v| v.parse().ok()).unwrap_or(60),
            rate_limit_window_ms: env("RATE_LIMIT_WINDOW_MS").and_then(|v| v.parse().ok()).unwrap_or(60_000),
        })
    }

    pub fn is_host_allowed(&self, host: &str) -> bool {
        let host = host.split(':').next().unwrap_or(host);
        if is_loopback(host) || host == self.host {
            return true;
        }
        self.allowed_hosts.iter().any(|h| h == host)
    }
}

fn is_loopback(host: &str) -> bool {
    if host == "localhost" {
        return true;
    }
    host.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false)
}
