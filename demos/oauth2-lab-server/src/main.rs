use anyhow::{Context, Result};
use oauth2_lab_client::{InMemorySessionStore, LoginFlow, OAuth2Client, ProviderRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

mod config;
mod pages;
mod routes;

use config::Config;
use routes::AppState;

const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(config.log_filter()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "compact" => builder.compact().init(),
        _ => builder.pretty().init(),
    }
}

/// Subscriber for events emitted before the configured one is installed
fn bootstrap_subscriber<W>(filter: EnvFilter, writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(writer)
        .finish()
}

fn load_config() -> Result<Config> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let bootstrap = bootstrap_subscriber(filter, std::io::stderr);
    tracing::subscriber::with_default(bootstrap, Config::load)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = load_config().context("Failed to load configuration")?;
    init_tracing(&config);

    let base_url = config.base_url();
    let registry = ProviderRegistry::from_credentials(&base_url, config.provider_credentials())
        .context("Invalid provider configuration")?;

    let client =
        OAuth2Client::new(&config.oauth2_config()).context("Failed to create OAuth2 client")?;

    let sessions = Arc::new(InMemorySessionStore::new());
    let cleanup_store = sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let expired = cleanup_store.cleanup_expired().await;
            if expired > 0 {
                debug!("Dropped {} expired login attempts", expired);
            }
        }
    });

    let flow = LoginFlow::new(
        client,
        Arc::new(registry),
        sessions,
        config.oauth.pending_ttl_seconds,
    );

    let names = flow.registry().names();
    if names.is_empty() {
        warn!(
            "No providers configured. Set GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET \
             or GITHUB_CLIENT_ID/GITHUB_CLIENT_SECRET."
        );
    }
    for name in &names {
        info!("Configured provider: {}", name);
    }

    let app = routes::router(AppState {
        flow: flow.clone(),
        secure_cookies: config.server.secure_cookies,
    });

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("OAuth2.0/OIDC lab running on {}", base_url);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
