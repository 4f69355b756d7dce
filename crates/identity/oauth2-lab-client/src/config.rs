//! OAuth2 configuration types.

use crate::error::{OAuth2Error, OAuth2Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use url::Url;

/// Encoding the token endpoint uses for its response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenResponseFormat {
    #[default]
    Json,
    FormUrlEncoded,
}

/// OAuth2 provider configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub client_id: String,
    /// Absent for public clients
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    /// Space-delimited scope string
    pub scope: String,
    /// Whether `code_verifier` is sent on token exchange
    pub supports_pkce: bool,
    /// Additional query parameters for the authorization request
    #[serde(default)]
    pub authorization_params: HashMap<String, String>,
    /// Extra headers sent with every token endpoint request
    #[serde(default)]
    pub token_headers: HashMap<String, String>,
    #[serde(default)]
    pub token_response_format: TokenResponseFormat,
}

impl ProviderConfig {
    /// Check the descriptor invariants: every field except the client secret
    /// is non-empty and all endpoints are absolute http(s) URLs.
    pub fn validate(&self) -> OAuth2Result<()> {
        let required = [
            ("name", &self.name),
            ("client_id", &self.client_id),
            ("redirect_uri", &self.redirect_uri),
            ("authorization_endpoint", &self.authorization_endpoint),
            ("token_endpoint", &self.token_endpoint),
            ("userinfo_endpoint", &self.userinfo_endpoint),
            ("scope", &self.scope),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(OAuth2Error::Config(format!(
                    "Provider '{}': {} must not be empty",
                    self.name, field
                )));
            }
        }

        for (field, value) in [
            ("redirect_uri", &self.redirect_uri),
            ("authorization_endpoint", &self.authorization_endpoint),
            ("token_endpoint", &self.token_endpoint),
            ("userinfo_endpoint", &self.userinfo_endpoint),
        ] {
            let url = Url::parse(value)?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(OAuth2Error::Config(format!(
                    "Provider '{}': {} must be an http(s) URL, got '{}'",
                    self.name, field, value
                )));
            }
        }

        Ok(())
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_token_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.token_headers.insert(name.into(), value.into());
        self
    }

    /// Client secret, treating an empty string as absent.
    pub(crate) fn secret(&self) -> Option<&str> {
        self.client_secret.as_deref().filter(|s| !s.is_empty())
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("userinfo_endpoint", &self.userinfo_endpoint)
            .field("scope", &self.scope)
            .field("supports_pkce", &self.supports_pkce)
            .field("authorization_params", &self.authorization_params)
            .field("token_headers", &self.token_headers)
            .field("token_response_format", &self.token_response_format)
            .finish()
    }
}

/// OAuth2 client configuration
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    pub http_timeout_seconds: u64,
    /// How long a pending authorization waits for its callback
    pub pending_ttl_seconds: u64,
    pub user_agent: String,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            http_timeout_seconds: 10,
            pending_ttl_seconds: 600, // 10 minutes
            user_agent: concat!("oauth2-lab/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl OAuth2Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = seconds;
        self
    }

    pub fn with_pending_ttl(mut self, seconds: u64) -> Self {
        self.pending_ttl_seconds = seconds;
        self
    }
}
