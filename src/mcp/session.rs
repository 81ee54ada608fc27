// src/mcp/session.rs
//
// Proxy-wide mutable state: the upstream-issued session token, the default
// grant, and the grant lookup reference, all under one read-write lock
// (spec §3 SessionState, §5: "session token, default grant, and grant-store
// reference are read and written under a single read-write lock"). Modeled
// on this codebase's `WebhookStore` (webhook.rs), which wraps its map the
// same way with `tokio::sync::RwLock`.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::grant::GrantLookup;

struct Inner {
    session_token: Option<String>,
    default_grant: Option<String>,
    grant_store: Option<Arc<dyn GrantLookup>>,
}

#[derive(Clone)]
pub struct SessionState {
    inner: Arc<RwLock<Inner>>,
}

impl SessionState {
    pub fn new(default_grant: Option<String>, grant_store: Option<Arc<dyn GrantLookup>>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                session_token: None,
                default_grant,
                grant_store,
            })),
        }
    }

    pub async fn session_token(&self) -> Option<String> {
        self.inner.read().await.session_token.clone()
    }

    /// Capture a session token observed on a response (spec §3 invariant:
    /// "once non-empty, never cleared except by process exit"; §8 invariant
    /// 7: later values overwrite).
    pub async fn set_session_token(&self, token: String) {
        if token.is_empty() {
            return;
        }
        self.inner.write().await.session_token = Some(token);
    }

    pub async fn default_grant(&self) -> Option<String> {
        self.inner.read().await.default_grant.clone()
    }

    pub async fn set_default_grant(&self, grant: Option<String>) {
        self.inner.write().await.default_grant = grant;
    }

    pub async fn grant_store(&self) -> Option<Arc<dyn GrantLookup>> {
        self.inner.read().await.grant_store.clone()
    }

    pub async fn set_grant_store(&self, store: Arc<dyn GrantLookup>) {
        self.inner.write().await.grant_store = Some(store);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_token_starts_empty_and_persists_once_set() {
        let state = SessionState::new(None, None);
        assert_eq!(state.session_token().await, None);

        state.set_session_token("tok-1".to_string()).await;
        assert_eq!(state.session_token().await.as_deref(), Some("tok-1"));

        state.set_session_token("tok-2".to_string()).await;
        assert_eq!(state.session_token().await.as_deref(), Some("tok-2"));
    }

    #[tokio::test]
    async fn empty_token_is_ignored() {
        let state = SessionState::new(None, None);
        state.set_session_token("tok-1".to_string()).await;
        state.set_session_token(String::new()).await;
        assert_eq!(state.session_token().await.as_deref(), Some("tok-1"));
    }

    #[tokio::test]
    async fn default_grant_round_trips() {
        let state = SessionState::new(Some("g1".to_string()), None);
        assert_eq!(state.default_grant().await.as_deref(), Some("g1"));
        state.set_default_grant(Some("g2".to_string())).await;
        assert_eq!(state.default_grant().await.as_deref(), Some("g2"));
    }
}
