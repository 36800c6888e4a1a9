//! Static-token and OAuth-introspection authentication (spec §4.9).

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use superfetch_core::auth::{AuthFingerprint, AuthInfo};
use superfetch_core::Error;
use tokio::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Keyed HMAC of `clientId:token`, used to bind a session to the credential
/// that created it (spec GLOSSARY "Auth fingerprint").
pub fn fingerprint(key: &[u8], auth: &AuthInfo) -> AuthFingerprint {
    let data = format!("{}:{}", auth.client_id, auth.token);
    AuthFingerprint(hex::encode(digest(key, data.as_bytes())))
}

fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub enum AuthMode {
    StaticTokens {
        digests: Vec<[u8; 32]>,
        hmac_key: Vec<u8>,
        required_scopes: Vec<String>,
    },
    OAuthIntrospection {
        introspection_url: String,
        client_id: Option<String>,
        client_secret: Option<String>,
        timeout: Duration,
    },
}

pub struct AuthService {
    mode: AuthMode,
    http: reqwest::Client,
}

impl AuthService {
    pub fn static_tokens(tokens: &[String], hmac_key: &[u8], required_scopes: Vec<String>) -> Self {
        let digests = tokens
            .iter()
            .map(|token| digest(hmac_key, token.as_bytes()))
            .collect();
        Self {
            mode: AuthMode::StaticTokens {
                digests,
                hmac_key: hmac_key.to_vec(),
                required_scopes,
            },
            http: reqwest::Client::new(),
        }
    }

    pub fn oauth_introspection(
        introspection_url: String,
        client_id: Option<String>,
        client_secret: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            mode: AuthMode::OAuthIntrospection {
                introspection_url,
                client_id,
                client_secret,
                timeout,
            },
            http: reqwest::Client::new(),
        }
    }

    /// Builds either mode from environment variables, preferring OAuth
    /// introspection when `SUPERFETCH_OAUTH_INTROSPECTION_URL` is set.
    pub fn from_env(hmac_key: &[u8]) -> Option<Self> {
        if let Some(url) = env("SUPERFETCH_OAUTH_INTROSPECTION_URL") {
            let timeout_secs = env("SUPERFETCH_OAUTH_TIMEOUT_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(5);
            return Some(Self::oauth_introspection(
                url,
                env("SUPERFETCH_OAUTH_CLIENT_ID"),
                env("SUPERFETCH_OAUTH_CLIENT_SECRET"),
                Duration::from_secs(timeout_secs),
            ));
        }
        let tokens = env("SUPERFETCH_STATIC_TOKENS")?;
        let tokens: Vec<String> = tokens
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if tokens.is_empty() {
            return None;
        }
        let scopes = env("SUPERFETCH_REQUIRED_SCOPES")
            .map(|s| s.split(',').map(|x| x.trim().to_string()).collect())
            .unwrap_or_default();
        Some(Self::static_tokens(&tokens, hmac_key, scopes))
    }

    pub fn accepts_x_api_key(&self) -> bool {
        matches!(self.mode, AuthMode::StaticTokens { .. })
    }

    pub async fn verify(&self, token: &str, resource_url: Option<&str>) -> Result<AuthInfo, Error> {
        match &self.mode {
            AuthMode::StaticTokens {
                digests,
                hmac_key,
                required_scopes,
            } => self.verify_static(token, digests, hmac_key, required_scopes),
            AuthMode::OAuthIntrospection {
                introspection_url,
                client_id,
                client_secret,
                timeout,
            } => {
                self.verify_oauth(
                    token,
                    resource_url,
                    introspection_url,
                    client_id.as_deref(),
                    client_secret.as_deref(),
                    *timeout,
                )
                .await
            }
        }
    }

    fn verify_static(
        &self,
        token: &str,
        digests: &[[u8; 32]],
        hmac_key: &[u8],
        required_scopes: &[String],
    ) -> Result<AuthInfo, Error> {
        let presented = digest(hmac_key, token.as_bytes());
        let mut match_found = false;
        for stored in digests {
            match_found |= constant_time_eq(&presented, stored);
        }
        if !match_found {
            return Err(Error::InvalidToken("token not recognized".to_string()));
        }
        Ok(AuthInfo {
            token: token.to_string(),
            client_id: "static-token".to_string(),
            scopes: required_scopes.to_vec(),
            expires_at: Some(chrono::Utc::now().timestamp() + 24 * 3600),
            resource: None,
        })
    }

    async fn verify_oauth(
        &self,
        token: &str,
        resource_url: Option<&str>,
        introspection_url: &str,
        client_id: Option<&str>,
        client_secret: Option<&str>,
        timeout: Duration,
    ) -> Result<AuthInfo, Error> {
        let mut form = vec![
            ("token".to_string(), token.to_string()),
            ("token_type_hint".to_string(), "access_token".to_string()),
        ];
        if let Some(resource) = resource_url {
            form.push(("resource".to_string(), strip_fragment(resource)));
        }

        let mut request = self.http.post(introspection_url).timeout(timeout).form(&form);
        if let Some(id) = client_id {
            request = request.basic_auth(id, client_secret);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::InvalidToken(format!("introspection request failed: {e}")))?;

        let body: IntrospectionResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidToken(format!("invalid introspection response: {e}")))?;

        if !body.active {
            return Err(Error::InvalidToken("token is not active".to_string()));
        }

        Ok(AuthInfo {
            token: token.to_string(),
            client_id: body.client_id.unwrap_or_else(|| "oauth-client".to_string()),
            scopes: body
                .scope
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            expires_at: body.exp,
            resource: resource_url.map(strip_fragment),
        })
    }
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    client_id: Option<String>,
    scope: Option<String>,
    exp: Option<i64>,
}

fn strip_fragment(url: &str) -> String {
    url.split('#').next().unwrap_or(url).to_string()
}

/// A convenience key for tests and callers with no key-management opinion of
/// their own. `static_tokens` stores whatever key it's given alongside the
/// digests derived from it, so `verify` always recomputes with the matching
/// key regardless of which one a caller passes.
const STATIC_HMAC_KEY: &[u8] = b"superfetch-static-token-hmac-v1";

fn digest(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Compares two digests in constant time, accumulating match bits rather
/// than short-circuiting (spec §4.9).
fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff = 0u8;
    for i in 0..32 {
        diff |= a[i] ^ b[i];
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_token_accepts_configured_token() {
        let auth = AuthService::static_tokens(
            &["secret-token".to_string()],
            STATIC_HMAC_KEY,
            vec!["fetch".to_string()],
        );
        let info = auth.verify("secret-token", None).await.unwrap();
        assert_eq!(info.client_id, "static-token");
    }

    #[tokio::test]
    async fn static_token_accepts_configured_token_under_a_key_distinct_from_any_caller_default() {
        // A regression guard: the service must verify with whichever key it was
        // constructed with, not a second, unrelated key some other part of the
        // process happens to use for something else (e.g. a session fingerprint).
        let construction_key = b"some-callers-own-key-v7";
        let auth = AuthService::static_tokens(
            &["secret-token".to_string()],
            construction_key,
            vec![],
        );
        assert!(auth.verify("secret-token", None).await.is_ok());
    }

    #[tokio::test]
    async fn static_token_rejects_unknown_token() {
        let auth = AuthService::static_tokens(
            &["secret-token".to_string()],
            STATIC_HMAC_KEY,
            vec![],
        );
        assert!(auth.verify("wrong-token", None).await.is_err());
    }

    #[test]
    fn constant_time_eq_matches_identical_digests() {
        let a = digest(b"k", b"v");
        let b = digest(b"k", b"v");
        assert!(constant_time_eq(&a, &b));
    }
}
