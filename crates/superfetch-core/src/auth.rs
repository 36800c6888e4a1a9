//! Auth Info and fingerprinting (spec §3, §4.9).

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AuthInfo {
    /// Opaque presented token. Never serialized into logs or session records.
    #[serde(skip_serializing)]
    pub token: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub expires_at: Option<i64>,
    pub resource: Option<String>,
}

impl AuthInfo {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Keyed HMAC of `clientId:token`, bound to a session to prevent cross-credential
/// session reuse (spec GLOSSARY: "Auth fingerprint").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AuthFingerprint(pub String);

impl std::fmt::Display for AuthFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
