//! OAuth2 protocol types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Authorization request for one login attempt.
///
/// `state` and `code_verifier` must be kept by the caller until the callback
/// arrives and then discarded.
#[derive(Clone)]
pub struct AuthorizationRequest {
    pub redirect_url: String,
    pub state: String,
    pub code_verifier: String,
    pub code_challenge: String,
}

impl fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("redirect_url", &self.redirect_url)
            .field("state", &self.state)
            .field("code_verifier", &"<redacted>")
            .field("code_challenge", &self.code_challenge)
            .finish()
    }
}

/// Query parameters delivered to the redirect URI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Successful token endpoint response (RFC 6749 section 5.1)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default, deserialize_with = "deserialize_expires_in")]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// Error token endpoint response (RFC 6749 section 5.2)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_uri: Option<String>,
}

impl fmt::Display for TokenErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {}", self.error, description),
            None => f.write_str(&self.error),
        }
    }
}

// Form-encoded responses carry every value as a string.
fn deserialize_expires_in<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) if s.is_empty() => Ok(None),
        Some(NumberOrString::String(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Tokens issued by a provider, owned by the session after issuance.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Seconds until `access_token` expiry, relative to `issued_at`
    pub expires_in: Option<u64>,
    pub token_type: String,
    pub scope: Option<String>,
    /// Carried through opaquely, never verified
    pub id_token: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl TokenSet {
    pub fn from_response(response: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            expires_in: response.expires_in,
            token_type: response
                .token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Bearer".to_string()),
            scope: response.scope,
            id_token: response.id_token,
            issued_at,
        }
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let seconds = i64::try_from(self.expires_in?).ok()?;
        self.issued_at.checked_add_signed(Duration::seconds(seconds))
    }

    /// Tokens without an advertised lifetime never report expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_at().is_some_and(|at| at <= Utc::now())
    }

    pub fn will_expire_within(&self, window: Duration) -> bool {
        self.expires_at().is_some_and(|at| at <= Utc::now() + window)
    }

    /// Keep the previous refresh token when the provider did not rotate it.
    pub(crate) fn retain_refresh_token(mut self, previous: &TokenSet) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.refresh_token.clone();
        }
        self
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Provider-defined claims, passed through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserInfo(pub serde_json::Map<String, serde_json::Value>);

impl UserInfo {
    pub fn get(&self, claim: &str) -> Option<&serde_json::Value> {
        self.0.get(claim)
    }

    /// User identifier: `sub` (OpenID Connect) or `id` (GitHub, numeric).
    pub fn subject(&self) -> Option<String> {
        ["sub", "id"]
            .iter()
            .filter_map(|claim| self.0.get(*claim))
            .find_map(|value| match value {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }

    pub fn email(&self) -> Option<&str> {
        self.0.get("email").and_then(|v| v.as_str())
    }

    /// Display name: `name`, falling back to GitHub's `login`.
    pub fn name(&self) -> Option<&str> {
        ["name", "login"]
            .iter()
            .find_map(|claim| self.0.get(*claim).and_then(|v| v.as_str()))
    }

    pub fn claims(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }
}
