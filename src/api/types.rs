//! Shared types for the API layer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::config;
use crate::consent::ConsentService;
use crate::engine::Engine;

// ═══════════════════════════════════════════════════════════
// API context — shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware. Wraps the engine
/// plus the API-specific session and consent state.
#[derive(Clone)]
pub struct ApiContext {
    pub engine: Arc<Engine>,
    pub consent: Arc<ConsentService>,
    pub sessions: Arc<Mutex<SessionRegistry>>,
}

impl ApiContext {
    pub fn new(engine: Arc<Engine>, consent: Arc<ConsentService>) -> Self {
        Self {
            engine,
            consent,
            sessions: Arc::new(Mutex::new(SessionRegistry::new())),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Token helpers
// ═══════════════════════════════════════════════════════════

/// Hash a bearer token string using SHA-256.
pub fn hash_token(token: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Generate a random bearer token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    use base64::Engine;
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

// ═══════════════════════════════════════════════════════════
// Session registry
// ═══════════════════════════════════════════════════════════

struct SessionEntry {
    principal_id: Uuid,
    expires_at: Instant,
}

/// In-memory bearer sessions, keyed by token hash. Only the hash is
/// retained; the plaintext token exists nowhere after issue.
pub struct SessionRegistry {
    sessions: HashMap<[u8; 32], SessionEntry>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            ttl: Duration::from_secs(config::SESSION_TTL_SECS),
        }
    }

    /// Issue a bearer token for a principal. Returns the plaintext
    /// token; it is handed to the client once and never stored.
    pub fn issue(&mut self, principal_id: Uuid) -> String {
        self.cleanup();
        let token = generate_token();
        self.sessions.insert(
            hash_token(&token),
            SessionEntry {
                principal_id,
                expires_at: Instant::now() + self.ttl,
            },
        );
        token
    }

    /// Resolve a bearer token to its principal id, if live.
    pub fn resolve(&self, token: &str) -> Option<Uuid> {
        let entry = self.sessions.get(&hash_token(token))?;
        if Instant::now() > entry.expires_at {
            return None;
        }
        Some(entry.principal_id)
    }

    /// Revoke the session behind a token. Idempotent.
    pub fn revoke(&mut self, token: &str) {
        self.sessions.remove(&hash_token(token));
    }

    /// Drop expired sessions. Runs on every issue and from the
    /// background maintenance loop.
    pub fn cleanup(&mut self) {
        let now = Instant::now();
        self.sessions.retain(|_, e| now < e.expires_at);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
        assert!(!t1.is_empty());
    }

    #[test]
    fn hash_token_is_deterministic() {
        assert_eq!(hash_token("test"), hash_token("test"));
        assert_ne!(hash_token("token-a"), hash_token("token-b"));
    }

    #[test]
    fn issued_session_resolves() {
        let mut registry = SessionRegistry::new();
        let principal = Uuid::new_v4();
        let token = registry.issue(principal);
        assert_eq!(registry.resolve(&token), Some(principal));
    }

    #[test]
    fn unknown_token_does_not_resolve() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.resolve("made-up-token"), None);
    }

    #[test]
    fn revoked_session_is_gone() {
        let mut registry = SessionRegistry::new();
        let token = registry.issue(Uuid::new_v4());
        registry.revoke(&token);
        assert_eq!(registry.resolve(&token), None);
        // Revoking again is harmless
        registry.revoke(&token);
    }

    #[test]
    fn expired_session_does_not_resolve() {
        let mut registry = SessionRegistry::new();
        let token = registry.issue(Uuid::new_v4());
        registry
            .sessions
            .get_mut(&hash_token(&token))
            .unwrap()
            .expires_at = Instant::now() - Duration::from_secs(1);
        assert_eq!(registry.resolve(&token), None);
    }

    #[test]
    fn cleanup_drops_expired_sessions() {
        let mut registry = SessionRegistry::new();
        let stale = registry.issue(Uuid::new_v4());
        registry
            .sessions
            .get_mut(&hash_token(&stale))
            .unwrap()
            .expires_at = Instant::now() - Duration::from_secs(1);

        // Issue triggers the sweep
        let live = registry.issue(Uuid::new_v4());
        assert_eq!(registry.sessions.len(), 1);
        assert!(registry.resolve(&live).is_some());
    }
}
