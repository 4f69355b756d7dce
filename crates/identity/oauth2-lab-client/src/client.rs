//! OAuth2 client implementation with PKCE support.

use crate::config::{OAuth2Config, ProviderConfig, TokenResponseFormat};
use crate::error::{OAuth2Error, OAuth2Result};
use crate::pkce::{PkceChallenge, generate_state};
use crate::types::{AuthorizationRequest, TokenErrorResponse, TokenResponse, TokenSet, UserInfo};
use chrono::Utc;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

/// Query parameters owned by the authorization request itself.
const RESERVED_AUTH_PARAMS: [&str; 7] = [
    "client_id",
    "redirect_uri",
    "response_type",
    "scope",
    "state",
    "code_challenge",
    "code_challenge_method",
];

#[derive(Debug, Clone, Copy)]
enum TokenOperation {
    Exchange,
    Refresh,
}

impl TokenOperation {
    fn error(self, detail: String) -> OAuth2Error {
        match self {
            TokenOperation::Exchange => OAuth2Error::TokenExchange(detail),
            TokenOperation::Refresh => OAuth2Error::TokenRefresh(detail),
        }
    }
}

/// OAuth2 client for handling authorization flows.
///
/// Holds no per-login state; every operation takes the provider descriptor
/// it acts on, so one client is shared by all concurrent requests.
#[derive(Clone)]
pub struct OAuth2Client {
    http_client: Client,
}

impl OAuth2Client {
    pub fn new(config: &OAuth2Config) -> OAuth2Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| OAuth2Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    pub fn with_http_client(http_client: Client) -> Self {
        Self { http_client }
    }

    /// Generate a fresh state and PKCE pair and build the authorization URL.
    pub fn begin_authorization(
        &self,
        provider: &ProviderConfig,
    ) -> OAuth2Result<AuthorizationRequest> {
        let mut url = Url::parse(&provider.authorization_endpoint)?;

        let state = generate_state();
        let pkce = PkceChallenge::new();

        // Keep the endpoint's own query, minus anything this request sets
        let existing: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| {
                let name: &str = key;
                let reserved = RESERVED_AUTH_PARAMS.contains(&name);
                if reserved {
                    warn!(
                        "Dropping '{}' from the authorization endpoint of provider {}",
                        key, provider.name
                    );
                }
                !reserved
            })
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.set_query(None);

        {
            let mut params = url.query_pairs_mut();
            params.extend_pairs(&existing);
            params.append_pair("client_id", &provider.client_id);
            params.append_pair("redirect_uri", &provider.redirect_uri);
            params.append_pair("response_type", "code");
            params.append_pair("scope", &provider.scope);
            params.append_pair("state", &state);
            params.append_pair("code_challenge", &pkce.code_challenge);
            params.append_pair("code_challenge_method", &pkce.code_challenge_method);

            for (key, value) in &provider.authorization_params {
                if RESERVED_AUTH_PARAMS.contains(&key.as_str()) {
                    warn!(
                        "Ignoring authorization parameter '{}' for provider {}",
                        key, provider.name
                    );
                    continue;
                }
                params.append_pair(key, value);
            }
        }

        debug!("Generated authorization URL for provider {}", provider.name);

        Ok(AuthorizationRequest {
            redirect_url: url.to_string(),
            state,
            code_verifier: pkce.code_verifier,
            code_challenge: pkce.code_challenge,
        })
    }

    /// Exchange authorization code for tokens
    pub async fn exchange_code(
        &self,
        provider: &ProviderConfig,
        code: &str,
        code_verifier: &str,
    ) -> OAuth2Result<TokenSet> {
        if code.is_empty() {
            return Err(OAuth2Error::MissingAuthorizationCode);
        }

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", provider.redirect_uri.as_str()),
            ("client_id", provider.client_id.as_str()),
        ];

        if provider.supports_pkce {
            form.push(("code_verifier", code_verifier));
        }

        if let Some(secret) = provider.secret() {
            form.push(("client_secret", secret));
        }

        let tokens = self
            .request_tokens(provider, &form, TokenOperation::Exchange)
            .await?;

        info!(
            "Successfully exchanged code for tokens with provider {}",
            provider.name
        );
        Ok(tokens)
    }

    /// Obtain a new access token from a refresh token.
    pub async fn refresh_token(
        &self,
        provider: &ProviderConfig,
        refresh_token: &str,
    ) -> OAuth2Result<TokenSet> {
        if refresh_token.is_empty() {
            return Err(OAuth2Error::MissingRefreshToken);
        }

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", provider.client_id.as_str()),
        ];

        if let Some(secret) = provider.secret() {
            form.push(("client_secret", secret));
        }

        let tokens = self
            .request_tokens(provider, &form, TokenOperation::Refresh)
            .await?;

        info!("Refreshed access token with provider {}", provider.name);
        Ok(tokens)
    }

    /// Refresh a stored token set.
    ///
    /// Fails without any network call when the set carries no refresh token.
    /// The previous refresh token is kept unless the provider rotated it.
    pub async fn refresh(
        &self,
        provider: &ProviderConfig,
        tokens: &TokenSet,
    ) -> OAuth2Result<TokenSet> {
        let refresh_token = tokens
            .refresh_token
            .as_deref()
            .ok_or(OAuth2Error::MissingRefreshToken)?;

        let refreshed = self.refresh_token(provider, refresh_token).await?;
        Ok(refreshed.retain_refresh_token(tokens))
    }

    /// Get user info using access token
    pub async fn fetch_user_info(
        &self,
        provider: &ProviderConfig,
        access_token: &str,
    ) -> OAuth2Result<UserInfo> {
        let response = self
            .http_client
            .get(&provider.userinfo_endpoint)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                error!("User info request to {} failed: {}", provider.name, e);
                OAuth2Error::UserInfo(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(
                "User info request to {} failed with status {}: {}",
                provider.name, status, error_text
            );
            return Err(OAuth2Error::UserInfo(describe_failure(status, error_text)));
        }

        let user_info: UserInfo = response.json().await.map_err(|e| {
            error!("Invalid user info response from {}: {}", provider.name, e);
            OAuth2Error::UserInfo(format!("Invalid user info response: {}", e))
        })?;

        debug!("Retrieved user info from provider {}", provider.name);
        Ok(user_info)
    }

    async fn request_tokens(
        &self,
        provider: &ProviderConfig,
        form: &[(&str, &str)],
        operation: TokenOperation,
    ) -> OAuth2Result<TokenSet> {
        let mut request = self.http_client.post(&provider.token_endpoint).form(form);

        let accept_configured = provider
            .token_headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("accept"));
        if !accept_configured {
            request = request.header(ACCEPT, "application/json");
        }
        for (name, value) in &provider.token_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            error!(
                "Token request ({:?}) to {} failed: {}",
                operation, provider.name, e
            );
            operation.error(e.to_string())
        })?;

        let status = response.status();
        let form_encoded = provider.token_response_format == TokenResponseFormat::FormUrlEncoded
            || response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

        let body = response.text().await.map_err(|e| {
            error!(
                "Failed to read token response ({:?}) from {}: {}",
                operation, provider.name, e
            );
            operation.error(e.to_string())
        })?;

        if !status.is_success() {
            error!(
                "Token request ({:?}) to {} failed with status {}: {}",
                operation, provider.name, status, body
            );
            return Err(operation.error(describe_failure(status, body)));
        }

        let value = decode_token_body(&body, form_encoded).map_err(|e| {
            error!("Invalid token response from {}: {}", provider.name, e);
            OAuth2Error::InvalidTokenResponse(e)
        })?;

        // Some providers (GitHub) report errors with a 200 status
        if value.get("error").is_some() {
            let detail = serde_json::from_value::<TokenErrorResponse>(value)
                .map(|err| err.to_string())
                .unwrap_or_else(|_| body.clone());
            error!(
                "Token request ({:?}) to {} returned an error: {}",
                operation, provider.name, detail
            );
            return Err(operation.error(detail));
        }

        let token_response: TokenResponse = serde_json::from_value(value).map_err(|e| {
            error!("Invalid token response from {}: {}", provider.name, e);
            OAuth2Error::InvalidTokenResponse(e.to_string())
        })?;

        Ok(TokenSet::from_response(token_response, Utc::now()))
    }
}

fn describe_failure(status: reqwest::StatusCode, body: String) -> String {
    if body.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        body
    }
}

fn decode_token_body(body: &str, form_encoded: bool) -> Result<serde_json::Value, String> {
    if form_encoded {
        let fields: serde_json::Map<String, serde_json::Value> =
            url::form_urlencoded::parse(body.as_bytes())
                .map(|(key, value)| {
                    (
                        key.into_owned(),
                        serde_json::Value::String(value.into_owned()),
                    )
                })
                .collect();
        return Ok(serde_json::Value::Object(fields));
    }

    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| e.to_string())?;
    if !value.is_object() {
        return Err("token response is not a JSON object".to_string());
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkce::generate_code_challenge;
    use std::collections::HashMap;

    fn test_provider() -> ProviderConfig {
        ProviderConfig {
            name: "test_provider".to_string(),
            client_id: "test_client_id".to_string(),
            client_secret: Some("test_secret".to_string()),
            redirect_uri: "http://localhost:3000/callback/test_provider".to_string(),
            authorization_endpoint: "https://example.com/auth".to_string(),
            token_endpoint: "https://example.com/token".to_string(),
            userinfo_endpoint: "https://example.com/userinfo".to_string(),
            scope: "openid email".to_string(),
            supports_pkce: true,
            authorization_params: HashMap::new(),
            token_headers: HashMap::new(),
            token_response_format: TokenResponseFormat::Json,
        }
    }

    fn test_client() -> OAuth2Client {
        OAuth2Client::new(&OAuth2Config::default()).unwrap()
    }

    #[test]
    fn test_authorization_url_generation() {
        let client = test_client();
        let provider = test_provider();

        let request = client.begin_authorization(&provider).unwrap();

        let url = Url::parse(&request.redirect_url).unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
        assert_eq!(url.path(), "/auth");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        for key in RESERVED_AUTH_PARAMS {
            let count = pairs.iter().filter(|(k, _)| k == key).count();
            assert_eq!(count, 1, "expected exactly one '{}'", key);
        }

        let params: HashMap<_, _> = pairs.into_iter().collect();
        assert_eq!(params["client_id"], "test_client_id");
        assert_eq!(
            params["redirect_uri"],
            "http://localhost:3000/callback/test_provider"
        );
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], "openid email");
        assert_eq!(params["state"], request.state);
        assert_eq!(params["code_challenge"], request.code_challenge);
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(
            request.code_challenge,
            generate_code_challenge(&request.code_verifier)
        );
    }

    #[test]
    fn test_each_authorization_is_fresh() {
        let client = test_client();
        let provider = test_provider();

        let first = client.begin_authorization(&provider).unwrap();
        let second = client.begin_authorization(&provider).unwrap();

        assert_ne!(first.state, second.state);
        assert_ne!(first.code_verifier, second.code_verifier);
        assert_ne!(first.redirect_url, second.redirect_url);
    }

    #[test]
    fn test_authorization_params_cannot_override_protocol_params() {
        let client = test_client();
        let mut provider = test_provider();
        provider.authorization_endpoint =
            "https://example.com/auth?tenant=lab&scope=admin&response_type=token".to_string();
        provider
            .authorization_params
            .insert("access_type".to_string(), "offline".to_string());
        provider
            .authorization_params
            .insert("state".to_string(), "attacker".to_string());

        let request = client.begin_authorization(&provider).unwrap();
        let url = Url::parse(&request.redirect_url).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(pairs.contains(&("tenant".to_string(), "lab".to_string())));
        assert!(pairs.contains(&("access_type".to_string(), "offline".to_string())));
        let states: Vec<_> = pairs.iter().filter(|(k, _)| k == "state").collect();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].1, request.state);

        for key in RESERVED_AUTH_PARAMS {
            let count = pairs.iter().filter(|(k, _)| k == key).count();
            assert_eq!(count, 1, "expected exactly one '{}'", key);
        }
        assert!(pairs.contains(&("scope".to_string(), "openid email".to_string())));
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
    }

    #[test]
    fn test_invalid_authorization_endpoint() {
        let client = test_client();
        let mut provider = test_provider();
        provider.authorization_endpoint = "not a url".to_string();

        let result = client.begin_authorization(&provider);
        assert!(matches!(result, Err(OAuth2Error::Url(_))));
    }

    #[test]
    fn test_decode_form_encoded_token_body() {
        let value = decode_token_body(
            "access_token=gho_abc&scope=read%3Auser&token_type=bearer",
            true,
        )
        .unwrap();
        assert_eq!(value["access_token"], "gho_abc");
        assert_eq!(value["scope"], "read:user");

        assert!(decode_token_body("[1, 2]", false).is_err());
        assert!(decode_token_body("not json", false).is_err());
    }
}
