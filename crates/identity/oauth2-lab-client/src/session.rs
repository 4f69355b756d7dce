//! Session persistence contract for the login flow.

use crate::error::OAuth2Result;
use crate::types::{TokenSet, UserInfo};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Login attempt waiting for the provider callback.
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub provider: String,
    pub state: String,
    pub code_verifier: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingAuthorization {
    pub fn new(provider: String, state: String, code_verifier: String, ttl_seconds: u64) -> Self {
        let created_at = Utc::now();
        let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);
        let expires_at = created_at
            .checked_add_signed(Duration::seconds(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            provider,
            state,
            code_verifier,
            created_at,
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

impl std::fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAuthorization")
            .field("provider", &self.provider)
            .field("state", &self.state)
            .field("code_verifier", &"<redacted>")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Result of a completed login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub provider: String,
    pub tokens: TokenSet,
    pub user_info: UserInfo,
}

/// Per-session data.
///
/// `generation` increases on every write, so a request that read the session
/// before a slow provider call can tell whether it was replaced meanwhile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    pub pending: Option<PendingAuthorization>,
    pub user: Option<AuthenticatedUser>,
    #[serde(default)]
    pub generation: u64,
}

/// Where a session stands in the login state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Idle,
    AwaitingCallback,
    Authenticated,
}

impl SessionData {
    pub fn login_state(&self) -> LoginState {
        if self.user.is_some() {
            LoginState::Authenticated
        } else if self.pending.is_some() {
            LoginState::AwaitingCallback
        } else {
            LoginState::Idle
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none() && self.user.is_none()
    }

    fn touch(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }
}

/// Session storage keyed by session id.
///
/// Every mutation is a single atomic step; nothing is read, awaited on and
/// written back as a whole.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> OAuth2Result<Option<SessionData>>;

    /// Store a pending authorization, replacing any earlier one and keeping
    /// the signed-in user. Returns the new generation.
    async fn set_pending(
        &self,
        session_id: &str,
        pending: PendingAuthorization,
    ) -> OAuth2Result<u64>;

    /// Remove the pending authorization, returning it with the generation
    /// it leaves behind.
    async fn take_pending(
        &self,
        session_id: &str,
    ) -> OAuth2Result<Option<(PendingAuthorization, u64)>>;

    /// Store the user only if the session still exists at `generation`.
    /// Returns `false` when it was ended or written to in the meantime.
    async fn set_user_if_current(
        &self,
        session_id: &str,
        generation: u64,
        user: AuthenticatedUser,
    ) -> OAuth2Result<bool>;

    /// Drop the session if it is empty and still at `generation`.
    async fn release_if_empty(&self, session_id: &str, generation: u64) -> OAuth2Result<()>;

    async fn destroy(&self, session_id: &str) -> OAuth2Result<()>;
}

/// In-memory implementation of SessionStore
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionData>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop pending authorizations past their TTL, removing sessions this
    /// leaves empty. Returns the number of expired pending authorizations.
    pub async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut expired = 0;

        sessions.retain(|_, data| {
            if !data.pending.as_ref().is_some_and(|p| p.is_expired()) {
                return true;
            }
            data.pending = None;
            data.touch();
            expired += 1;
            !data.is_empty()
        });

        expired
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    #[cfg(test)]
    pub(crate) async fn insert(&self, session_id: &str, data: SessionData) {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), data);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> OAuth2Result<Option<SessionData>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }

    async fn set_pending(
        &self,
        session_id: &str,
        pending: PendingAuthorization,
    ) -> OAuth2Result<u64> {
        let mut sessions = self.sessions.write().await;
        let data = sessions.entry(session_id.to_string()).or_default();
        data.pending = Some(pending);
        Ok(data.touch())
    }

    async fn take_pending(
        &self,
        session_id: &str,
    ) -> OAuth2Result<Option<(PendingAuthorization, u64)>> {
        let mut sessions = self.sessions.write().await;
        let Some(data) = sessions.get_mut(session_id) else {
            return Ok(None);
        };
        let Some(pending) = data.pending.take() else {
            return Ok(None);
        };
        Ok(Some((pending, data.touch())))
    }

    async fn set_user_if_current(
        &self,
        session_id: &str,
        generation: u64,
        user: AuthenticatedUser,
    ) -> OAuth2Result<bool> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(data) if data.generation == generation => {
                data.user = Some(user);
                data.touch();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_if_empty(&self, session_id: &str, generation: u64) -> OAuth2Result<()> {
        let mut sessions = self.sessions.write().await;
        let releasable = sessions
            .get(session_id)
            .is_some_and(|data| data.generation == generation && data.is_empty());
        if releasable {
            sessions.remove(session_id);
        }
        Ok(())
    }

    async fn destroy(&self, session_id: &str) -> OAuth2Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        Ok(())
    }
}
