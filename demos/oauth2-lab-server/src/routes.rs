//! HTTP routes of the lab relying party.

use crate::pages;
use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use oauth2_lab_client::{CallbackParams, LoginFlow, OAuth2Error};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const SESSION_COOKIE: &str = "oauth2_lab_session";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub flow: LoginFlow,
    pub secure_cookies: bool,
}

/// Error returned from handlers, rendered as an HTML error page
#[derive(Debug)]
pub struct AppError(OAuth2Error);

impl From<OAuth2Error> for AppError {
    fn from(err: OAuth2Error) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OAuth2Error::InvalidProvider(_) => StatusCode::NOT_FOUND,
            OAuth2Error::ProviderDeniedAccess { .. }
            | OAuth2Error::CsrfStateMismatch
            | OAuth2Error::AuthorizationExpired
            | OAuth2Error::MissingAuthorizationCode
            | OAuth2Error::MissingRefreshToken
            | OAuth2Error::NotAuthenticated => StatusCode::BAD_REQUEST,
            OAuth2Error::SessionSuperseded => StatusCode::CONFLICT,
            OAuth2Error::TokenExchange(_)
            | OAuth2Error::TokenRefresh(_)
            | OAuth2Error::UserInfo(_)
            | OAuth2Error::InvalidTokenResponse(_)
            | OAuth2Error::Config(_)
            | OAuth2Error::Url(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }

        let body = pages::error_page(status, &self.0.user_message());
        (status, Html(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/auth/{provider}", get(start_login_handler))
        .route("/callback/{provider}", get(callback_handler))
        .route("/refresh", get(refresh_handler))
        .route("/logout", get(logout_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn session_id(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|id| !id.is_empty())
}

/// Reuse the browser's session key or issue a new one
fn ensure_session(jar: CookieJar, secure: bool) -> (CookieJar, String) {
    if let Some(id) = session_id(&jar) {
        return (jar, id);
    }

    let id = uuid::Uuid::new_v4().to_string();
    let cookie = Cookie::build((SESSION_COOKIE, id.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build();

    (jar.add(cookie), id)
}

async fn index_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Html<String>, AppError> {
    if let Some(id) = session_id(&jar) {
        if let Some(user) = state.flow.current_user(&id).await? {
            return Ok(Html(pages::user_page(&user)));
        }
    }

    Ok(Html(pages::login_page(&state.flow.registry().names())))
}

async fn start_login_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    // Unknown providers are rejected before a session is issued
    state.flow.registry().get(&provider)?;

    let (jar, id) = ensure_session(jar, state.secure_cookies);
    let redirect_url = state.flow.login(&id, &provider).await?;

    Ok((jar, Redirect::to(&redirect_url)))
}

async fn callback_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Result<Redirect, AppError> {
    info!("Handling OAuth2 callback for provider: {}", provider);

    // Without a session cookie there is no pending authorization to match
    let id = session_id(&jar).unwrap_or_default();
    state.flow.handle_callback(&id, &provider, params).await?;

    Ok(Redirect::to("/"))
}

async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Redirect, AppError> {
    let id = session_id(&jar).ok_or(OAuth2Error::NotAuthenticated)?;
    state.flow.refresh(&id).await?;

    info!("Access token refreshed");
    Ok(Redirect::to("/"))
}

async fn logout_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    if let Some(id) = session_id(&jar) {
        state.flow.logout(&id).await?;
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, Redirect::to("/")))
}

async fn health_handler() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header};
    use oauth2_lab_client::{
        InMemorySessionStore, OAuth2Client, OAuth2Config, ProviderCredentials, ProviderPreset,
        ProviderRegistry,
    };
    use std::sync::Arc;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn google_against(server: &MockServer) -> ProviderRegistry {
        let mut google = ProviderPreset::Google.descriptor(ProviderCredentials {
            client_id: "google-id".to_string(),
            client_secret: Some("google-secret".to_string()),
            redirect_uri: "http://localhost:3000/callback/google".to_string(),
        });
        google.authorization_endpoint = format!("{}/authorize", server.uri());
        google.token_endpoint = format!("{}/token", server.uri());
        google.userinfo_endpoint = format!("{}/userinfo", server.uri());

        ProviderRegistry::builder().register(google).unwrap().build()
    }

    fn test_app(registry: ProviderRegistry) -> Router {
        let client = OAuth2Client::new(&OAuth2Config::default()).unwrap();
        let flow = LoginFlow::new(
            client,
            Arc::new(registry),
            Arc::new(InMemorySessionStore::new()),
            600,
        );
        router(AppState {
            flow,
            secure_cookies: false,
        })
    }

    fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &Response) -> String {
        response.headers()[header::LOCATION]
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(ProviderRegistry::default());
        let response = app.oneshot(get_request("/health", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");
    }

    #[tokio::test]
    async fn test_index_lists_configured_providers() {
        let server = MockServer::start().await;
        let app = test_app(google_against(&server));

        let response = app.oneshot(get_request("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_text(response).await;
        assert!(body.contains(r#"href="/auth/google""#));
        assert!(!body.contains("/auth/github"));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_not_found() {
        let app = test_app(ProviderRegistry::default());

        let response = app
            .clone()
            .oneshot(get_request("/auth/facebook", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert!(body_text(response).await.contains("Provider not found"));

        let response = app
            .oneshot(get_request("/callback/facebook?code=x&state=y", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_login_sets_session_cookie() {
        let server = MockServer::start().await;
        let app = test_app(google_against(&server));

        let response = app.oneshot(get_request("/auth/google", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(location(&response).starts_with(&format!("{}/authorize?", server.uri())));

        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with(&format!("{}=", SESSION_COOKIE)));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(!cookie.contains("Secure"));
    }

    #[tokio::test]
    async fn test_callback_without_session_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let app = test_app(google_against(&server));
        let response = app
            .oneshot(get_request("/callback/google?code=abc&state=forged", None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("Invalid state parameter"));
    }

    #[tokio::test]
    async fn test_callback_with_provider_error() {
        let server = MockServer::start().await;
        let app = test_app(google_against(&server));

        let response = app
            .oneshot(get_request(
                "/callback/google?error=access_denied&state=abc",
                Some(&format!("{}=some-session", SESSION_COOKIE)),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(
            body_text(response)
                .await
                .contains("Authentication error: access_denied")
        );
    }

    #[tokio::test]
    async fn test_superseded_session_is_conflict() {
        let response = AppError::from(OAuth2Error::SessionSuperseded).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(
            body_text(response)
                .await
                .contains("Your session changed during the request")
        );
    }

    #[tokio::test]
    async fn test_refresh_without_session() {
        let app = test_app(ProviderRegistry::default());
        let response = app.oneshot(get_request("/refresh", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_full_login_flow() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "abc123",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "sub": "42",
                "email": "user@example.com"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let app = test_app(google_against(&server));

        let response = app
            .clone()
            .oneshot(get_request("/auth/google", None))
            .await
            .unwrap();
        let cookie = response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        let authorize_url = url::Url::parse(&location(&response)).unwrap();
        let state = authorize_url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let response = app
            .clone()
            .oneshot(get_request(
                &format!("/callback/google?code=fixed_code&state={}", state),
                Some(&cookie),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");

        let response = app
            .clone()
            .oneshot(get_request("/", Some(&cookie)))
            .await
            .unwrap();
        let body = body_text(response).await;
        assert!(body.contains("Authenticated"));
        assert!(body.contains("user@example.com"));
        assert!(body.contains("abc123..."));

        // No refresh token was issued
        let response = app
            .clone()
            .oneshot(get_request("/refresh", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(
            body_text(response)
                .await
                .contains("No refresh token available")
        );

        let response = app
            .clone()
            .oneshot(get_request("/logout", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");

        let response = app.oneshot(get_request("/", Some(&cookie))).await.unwrap();
        assert!(body_text(response).await.contains("Login with:"));
    }
}
