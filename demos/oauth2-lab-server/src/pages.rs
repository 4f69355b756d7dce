//! HTML pages served by the lab.

use axum::http::StatusCode;
use oauth2_lab_client::AuthenticatedUser;

const TOKEN_PREVIEW_CHARS: usize = 20;

const STYLE: &str = r#"
    body { font-family: Arial, sans-serif; max-width: 800px; margin: 50px auto; padding: 20px; }
    h1 { color: #333; }
    .info, .user-info { background: #f0f0f0; padding: 20px; border-radius: 5px; margin: 20px 0; }
    .token-info { background: #e8f4f8; padding: 15px; border-radius: 5px; margin: 20px 0; }
    .error { background: #fdecea; padding: 20px; border-radius: 5px; margin: 20px 0; }
    a.button { display: inline-block; padding: 10px 20px; margin: 5px; background: #007bff;
               color: white; border-radius: 5px; text-decoration: none; }
    a.button:hover { background: #0056b3; }
    pre { background: #f5f5f5; padding: 10px; border-radius: 3px; overflow-x: auto; }
"#;

/// Escape text for use in HTML element content and attribute values
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>{STYLE}</style>
  </head>
  <body>
{body}
  </body>
</html>
"#,
        title = escape_html(title),
    )
}

fn token_preview(token: &str) -> String {
    let preview: String = token.chars().take(TOKEN_PREVIEW_CHARS).collect();
    format!("{}...", escape_html(&preview))
}

/// Landing page with one login button per configured provider
pub fn login_page(providers: &[&str]) -> String {
    let buttons = if providers.is_empty() {
        "    <p>No providers configured. Please set up environment variables.</p>".to_string()
    } else {
        providers
            .iter()
            .map(|name| {
                format!(
                    r#"    <a class="button" href="/auth/{}">{}</a>"#,
                    escape_html(name),
                    escape_html(&name.to_uppercase())
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let body = format!(
        r#"    <h1>OAuth2.0/OIDC Lab</h1>
    <div class="info">
      <h2>About</h2>
      <p>This is a demonstration of OAuth2.0 and OpenID Connect flows with:</p>
      <ul>
        <li>Authorization Code Flow with PKCE (Proof Key for Code Exchange)</li>
        <li>Refresh Token Support</li>
        <li>Scope and Claims Handling</li>
        <li>Multiple Identity Providers (Google, GitHub)</li>
      </ul>
    </div>
    <h2>Login with:</h2>
{buttons}"#
    );

    layout("OAuth2.0/OIDC Lab", &body)
}

/// Session overview for an authenticated user
pub fn user_page(user: &AuthenticatedUser) -> String {
    let user_info = serde_json::to_string_pretty(&user.user_info)
        .unwrap_or_else(|_| "{}".to_string());
    let tokens = &user.tokens;

    let refresh_token = tokens
        .refresh_token
        .as_deref()
        .map(|token| {
            format!(
                "\n      <p><strong>Refresh Token:</strong> {}</p>",
                token_preview(token)
            )
        })
        .unwrap_or_default();

    let expiry = match (tokens.expires_in, tokens.expires_at()) {
        (Some(seconds), Some(at)) => format!(
            "{} seconds (at {}{})",
            seconds,
            at.to_rfc3339(),
            if tokens.is_expired() { ", expired" } else { "" }
        ),
        _ => "not reported".to_string(),
    };

    let scope = tokens
        .scope
        .as_deref()
        .map(|scope| format!("\n      <p><strong>Scope:</strong> {}</p>", escape_html(scope)))
        .unwrap_or_default();

    let refresh_button = if tokens.can_refresh() {
        "\n    <a class=\"button\" href=\"/refresh\">Refresh Token</a>"
    } else {
        ""
    };

    let body = format!(
        r#"    <h1>OAuth2.0/OIDC Lab - Authenticated</h1>
    <div class="user-info">
      <h2>User Information</h2>
      <pre>{user_info}</pre>
    </div>
    <div class="token-info">
      <h2>Token Information</h2>
      <p><strong>Provider:</strong> {provider}</p>
      <p><strong>Access Token:</strong> {access_token}</p>{refresh_token}
      <p><strong>Expires In:</strong> {expiry}</p>{scope}
    </div>
    <a class="button" href="/logout">Logout</a>{refresh_button}"#,
        user_info = escape_html(&user_info),
        provider = escape_html(&user.provider),
        access_token = token_preview(&tokens.access_token),
        expiry = escape_html(&expiry),
    );

    layout("OAuth2.0/OIDC Lab - Authenticated", &body)
}

/// Error page shown for failed requests
pub fn error_page(status: StatusCode, message: &str) -> String {
    let body = format!(
        r#"    <h1>{status}</h1>
    <div class="error">
      <p>{message}</p>
    </div>
    <a class="button" href="/">Back</a>"#,
        status = escape_html(&status.to_string()),
        message = escape_html(message),
    );

    layout("OAuth2.0/OIDC Lab - Error", &body)
}
