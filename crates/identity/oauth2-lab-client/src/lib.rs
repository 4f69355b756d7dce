//! OAuth2 relying-party engine with PKCE support.
//!
//! This crate implements the client side of the OAuth2 Authorization Code
//! flow with PKCE (Proof Key for Code Exchange): state and verifier
//! generation, the authorization redirect, code-for-token exchange, token
//! refresh, and user info retrieval. Providers whose token endpoint deviates
//! from the default contract (GitHub) are described declaratively through
//! [`ProviderConfig`] flags.

mod client;
mod config;
mod error;
mod flow;
pub mod pkce;
mod registry;
mod session;
mod types;
mod variants;


pub use client::OAuth2Client;
pub use config::{OAuth2Config, ProviderConfig, TokenResponseFormat};
pub use error::{OAuth2Error, OAuth2Result};
pub use flow::LoginFlow;
pub use pkce::PkceChallenge;
pub use registry::{ProviderRegistry, ProviderRegistryBuilder};
pub use session::{
    AuthenticatedUser, InMemorySessionStore, LoginState, PendingAuthorization, SessionData,
    SessionStore,
};
pub use types::{
    AuthorizationRequest, CallbackParams, TokenErrorResponse, TokenResponse, TokenSet, UserInfo,
};
pub use variants::{ProviderCredentials, ProviderPreset};
