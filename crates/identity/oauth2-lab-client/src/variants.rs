//! Well-known provider presets.
//!
//! Each preset describes where a provider deviates from the default token
//! exchange contract purely through [`ProviderConfig`] flags, so one generic
//! exchange routine serves all of them.

use crate::config::{ProviderConfig, TokenResponseFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Credentials issued out-of-band by a provider.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderPreset {
    Google,
    GitHub,
}

impl ProviderPreset {
    pub const ALL: [ProviderPreset; 2] = [ProviderPreset::Google, ProviderPreset::GitHub];

    pub fn name(&self) -> &'static str {
        match self {
            ProviderPreset::Google => "google",
            ProviderPreset::GitHub => "github",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|preset| preset.name() == name)
    }

    /// Both presets are registered as confidential web clients; their token
    /// endpoints reject exchanges without the secret.
    pub fn requires_client_secret(&self) -> bool {
        match self {
            ProviderPreset::Google => true,
            ProviderPreset::GitHub => true,
        }
    }

    /// Build the provider descriptor for this preset.
    pub fn descriptor(&self, credentials: ProviderCredentials) -> ProviderConfig {
        match self {
            ProviderPreset::Google => ProviderConfig {
                name: self.name().to_string(),
                client_id: credentials.client_id,
                client_secret: credentials.client_secret,
                redirect_uri: credentials.redirect_uri,
                authorization_endpoint: "https://accounts.google.com/o/oauth2/v2/auth"
                    .to_string(),
                token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
                userinfo_endpoint: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
                scope: "openid profile email".to_string(),
                supports_pkce: true,
                // Google only issues refresh tokens for offline access
                authorization_params: HashMap::from([
                    ("access_type".to_string(), "offline".to_string()),
                    ("prompt".to_string(), "consent".to_string()),
                ]),
                token_headers: HashMap::new(),
                token_response_format: TokenResponseFormat::Json,
            },
            // GitHub OAuth apps ignore code_verifier and answer the token
            // request form-encoded unless JSON is asked for explicitly.
            ProviderPreset::GitHub => ProviderConfig {
                name: self.name().to_string(),
                client_id: credentials.client_id,
                client_secret: credentials.client_secret,
                redirect_uri: credentials.redirect_uri,
                authorization_endpoint: "https://github.com/login/oauth/authorize".to_string(),
                token_endpoint: "https://github.com/login/oauth/access_token".to_string(),
                userinfo_endpoint: "https://api.github.com/user".to_string(),
                scope: "read:user user:email".to_string(),
                supports_pkce: false,
                authorization_params: HashMap::new(),
                token_headers: HashMap::from([(
                    "Accept".to_string(),
                    "application/json".to_string(),
                )]),
                token_response_format: TokenResponseFormat::Json,
            },
        }
    }
}

impl fmt::Display for ProviderPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
