//! OAuth2 error types.

use thiserror::Error;

pub type OAuth2Result<T> = Result<T, OAuth2Error>;

#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("Provider '{0}' is not configured")]
    InvalidProvider(String),

    #[error("Identity provider denied access: {error}")]
    ProviderDeniedAccess {
        error: String,
        description: Option<String>,
    },

    #[error("State parameter does not match the pending authorization")]
    CsrfStateMismatch,

    #[error("Pending authorization has expired")]
    AuthorizationExpired,

    #[error("Missing authorization code")]
    MissingAuthorizationCode,

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("User info request failed: {0}")]
    UserInfo(String),

    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Session was ended or restarted while the request was in flight")]
    SessionSuperseded,
}

impl OAuth2Error {
    /// Message that is safe to show to the end user.
    ///
    /// Provider response bodies are kept out of this text; they are only
    /// written to the log when the error is raised.
    pub fn user_message(&self) -> String {
        match self {
            OAuth2Error::InvalidProvider(_) => "Provider not found".to_string(),
            OAuth2Error::ProviderDeniedAccess { error, .. } => {
                format!("Authentication error: {}", error)
            }
            OAuth2Error::CsrfStateMismatch => "Invalid state parameter".to_string(),
            OAuth2Error::AuthorizationExpired => {
                "Login attempt expired. Please try again.".to_string()
            }
            OAuth2Error::MissingAuthorizationCode => "Missing authorization code".to_string(),
            OAuth2Error::MissingRefreshToken => "No refresh token available".to_string(),
            OAuth2Error::NotAuthenticated => "Not authenticated".to_string(),
            OAuth2Error::TokenRefresh(_) => "Failed to refresh token".to_string(),
            OAuth2Error::SessionSuperseded => {
                "Your session changed during the request. Please try again.".to_string()
            }
            OAuth2Error::TokenExchange(_)
            | OAuth2Error::UserInfo(_)
            | OAuth2Error::InvalidTokenResponse(_) => {
                "Authentication failed. Please try again.".to_string()
            }
            OAuth2Error::Config(_) | OAuth2Error::Url(_) => "Internal server error".to_string(),
        }
    }

    /// Whether the user should restart the login flow from the beginning.
    pub fn requires_new_login(&self) -> bool {
        matches!(
            self,
            OAuth2Error::ProviderDeniedAccess { .. }
                | OAuth2Error::CsrfStateMismatch
                | OAuth2Error::AuthorizationExpired
                | OAuth2Error::MissingAuthorizationCode
                | OAuth2Error::TokenExchange(_)
                | OAuth2Error::InvalidTokenResponse(_)
                | OAuth2Error::NotAuthenticated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_provider_body() {
        let err = OAuth2Error::TokenExchange(
            r#"{"error":"invalid_grant","error_description":"Bad code"}"#.to_string(),
        );
        assert!(err.to_string().contains("invalid_grant"));
        assert!(!err.user_message().contains("invalid_grant"));
        assert_eq!(err.user_message(), "Authentication failed. Please try again.");
    }

    #[test]
    fn test_denied_access_is_shown_verbatim() {
        let err = OAuth2Error::ProviderDeniedAccess {
            error: "access_denied".to_string(),
            description: None,
        };
        assert_eq!(err.user_message(), "Authentication error: access_denied");
        assert!(err.requires_new_login());
        assert!(!OAuth2Error::TokenRefresh("x".to_string()).requires_new_login());
    }

    #[test]
    fn test_superseded_session_message() {
        let err = OAuth2Error::SessionSuperseded;
        assert_eq!(
            err.user_message(),
            "Your session changed during the request. Please try again."
        );
        assert!(!err.requires_new_login());
    }
}
