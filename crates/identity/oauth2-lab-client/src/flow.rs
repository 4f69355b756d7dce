//! Login flow: drives the client through a session store.
//!
//! The web layer calls [`LoginFlow::login`] when the user picks a provider,
//! [`LoginFlow::handle_callback`] when the provider redirects back, and
//! [`LoginFlow::refresh`] / [`LoginFlow::logout`] afterwards.

use crate::client::OAuth2Client;
use crate::config::ProviderConfig;
use crate::error::{OAuth2Error, OAuth2Result};
use crate::registry::ProviderRegistry;
use crate::session::{
    AuthenticatedUser, LoginState, PendingAuthorization, SessionData, SessionStore,
};
use crate::types::CallbackParams;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct LoginFlow {
    client: OAuth2Client,
    registry: Arc<ProviderRegistry>,
    sessions: Arc<dyn SessionStore>,
    pending_ttl_seconds: u64,
}

impl LoginFlow {
    pub fn new(
        client: OAuth2Client,
        registry: Arc<ProviderRegistry>,
        sessions: Arc<dyn SessionStore>,
        pending_ttl_seconds: u64,
    ) -> Self {
        Self {
            client,
            registry,
            sessions,
            pending_ttl_seconds,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Start a login attempt and return the URL to redirect the user to.
    ///
    /// Replaces any attempt already pending in the session; a callback for
    /// the older attempt then fails.
    pub async fn login(&self, session_id: &str, provider_name: &str) -> OAuth2Result<String> {
        let provider = self.registry.get(provider_name)?;
        let request = self.client.begin_authorization(provider)?;

        let pending = PendingAuthorization::new(
            provider.name.clone(),
            request.state,
            request.code_verifier,
            self.pending_ttl_seconds,
        );
        self.sessions.set_pending(session_id, pending).await?;

        info!("Started OAuth2 flow for provider: {}", provider_name);
        Ok(request.redirect_url)
    }

    /// Complete a login attempt from the provider's redirect.
    ///
    /// The pending authorization is consumed on every outcome. Nothing is
    /// sent to the token endpoint unless the callback carries no `error`
    /// and its `state` equals the stored one. If the session is ended or a
    /// new login starts while the provider is being called, the result is
    /// discarded with [`OAuth2Error::SessionSuperseded`].
    pub async fn handle_callback(
        &self,
        session_id: &str,
        provider_name: &str,
        params: CallbackParams,
    ) -> OAuth2Result<AuthenticatedUser> {
        let provider = self.registry.get(provider_name)?;
        let Some((pending, generation)) = self.sessions.take_pending(session_id).await? else {
            return Err(Self::reject_unsolicited(provider_name, params));
        };

        let user = match self.complete_login(provider, &pending, params).await {
            Ok(user) => user,
            Err(err) => {
                if let Err(release_err) =
                    self.sessions.release_if_empty(session_id, generation).await
                {
                    warn!("Failed to release session: {}", release_err);
                }
                return Err(err);
            }
        };

        let stored = self
            .sessions
            .set_user_if_current(session_id, generation, user.clone())
            .await?;
        if !stored {
            warn!(
                "Session changed during login with {}, discarding tokens",
                provider_name
            );
            return Err(OAuth2Error::SessionSuperseded);
        }

        info!(
            "Successfully authenticated user via provider: {}",
            provider_name
        );
        Ok(user)
    }

    fn reject_unsolicited(provider_name: &str, params: CallbackParams) -> OAuth2Error {
        match params.error {
            Some(error) => {
                warn!(
                    "Provider {} returned error on callback: {}",
                    provider_name, error
                );
                OAuth2Error::ProviderDeniedAccess {
                    error,
                    description: params.error_description,
                }
            }
            None => {
                warn!(
                    "Callback for {} without a pending authorization",
                    provider_name
                );
                OAuth2Error::CsrfStateMismatch
            }
        }
    }

    async fn complete_login(
        &self,
        provider: &ProviderConfig,
        pending: &PendingAuthorization,
        params: CallbackParams,
    ) -> OAuth2Result<AuthenticatedUser> {
        if let Some(error) = params.error {
            warn!(
                "Provider {} returned error on callback: {}",
                provider.name, error
            );
            return Err(OAuth2Error::ProviderDeniedAccess {
                error,
                description: params.error_description,
            });
        }

        let state_matches = params.state.as_deref() == Some(pending.state.as_str());
        if pending.provider != provider.name || !state_matches {
            warn!("State mismatch on callback for provider {}", provider.name);
            return Err(OAuth2Error::CsrfStateMismatch);
        }

        if pending.is_expired() {
            warn!("Expired authorization on callback for {}", provider.name);
            return Err(OAuth2Error::AuthorizationExpired);
        }

        let code = params
            .code
            .filter(|code| !code.is_empty())
            .ok_or(OAuth2Error::MissingAuthorizationCode)?;

        let tokens = self
            .client
            .exchange_code(provider, &code, &pending.code_verifier)
            .await?;

        let user_info = self
            .client
            .fetch_user_info(provider, &tokens.access_token)
            .await?;

        Ok(AuthenticatedUser {
            provider: provider.name.clone(),
            tokens,
            user_info,
        })
    }

    /// Refresh the session's access token.
    ///
    /// On failure the stored session is left untouched; the caller decides
    /// whether to send the user through a new login. Tokens obtained after
    /// the session was ended or restarted are discarded.
    pub async fn refresh(&self, session_id: &str) -> OAuth2Result<AuthenticatedUser> {
        let data = self
            .sessions
            .load(session_id)
            .await?
            .ok_or(OAuth2Error::NotAuthenticated)?;

        let mut user = data.user.ok_or(OAuth2Error::NotAuthenticated)?;
        if !user.tokens.can_refresh() {
            return Err(OAuth2Error::MissingRefreshToken);
        }

        let provider = self.registry.get(&user.provider)?;
        user.tokens = self.client.refresh(provider, &user.tokens).await?;

        let stored = self
            .sessions
            .set_user_if_current(session_id, data.generation, user.clone())
            .await?;
        if !stored {
            warn!("Session changed during token refresh, discarding tokens");
            return Err(OAuth2Error::SessionSuperseded);
        }

        Ok(user)
    }

    pub async fn logout(&self, session_id: &str) -> OAuth2Result<()> {
        self.sessions.destroy(session_id).await?;
        info!("Session ended");
        Ok(())
    }

    pub async fn current_user(&self, session_id: &str) -> OAuth2Result<Option<AuthenticatedUser>> {
        Ok(self
            .sessions
            .load(session_id)
            .await?
            .and_then(|data| data.user))
    }

    pub async fn login_state(&self, session_id: &str) -> OAuth2Result<LoginState> {
        Ok(self
            .sessions
            .load(session_id)
            .await?
            .map(|data: SessionData| data.login_state())
            .unwrap_or(LoginState::Idle))
    }
}
