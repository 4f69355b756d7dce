//! Configuration module for the OAuth2 lab server
//!
//! Sources, lowest to highest precedence:
//! - Default values
//! - Configuration file (oauth2-lab.toml)
//! - Environment variables with the OAUTH2_LAB__ prefix
//! - Legacy variables (PORT, GOOGLE_CLIENT_ID, GITHUB_CLIENT_SECRET, RUST_LOG, ...)

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use oauth2_lab_client::{OAuth2Config, ProviderCredentials, ProviderPreset};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, info};

/// Main configuration struct for the lab server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,

    /// OAuth2 client behaviour
    pub oauth: OAuthConfig,

    /// Client credentials per provider
    pub providers: ProvidersConfig,

    pub logging: LoggingConfig,
}

/// Server network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1)
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to bind to (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally visible base URL, used to derive redirect URIs
    /// (default: http://localhost:{port})
    #[serde(default)]
    pub public_url: Option<String>,

    /// Mark the session cookie `Secure`
    #[serde(default)]
    pub secure_cookies: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// Timeout for token and userinfo requests (default: 10)
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,

    /// Lifetime of a login attempt awaiting its callback (default: 600)
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub google: Option<ProviderSettings>,
    pub github: Option<ProviderSettings>,
}

/// Credentials for one provider
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub client_id: String,
    pub client_secret: Option<String>,

    /// Overrides the derived `{public_url}/callback/{provider}`
    pub redirect_uri: Option<String>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter string
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    3000
}

fn default_http_timeout() -> u64 {
    10
}

fn default_pending_ttl() -> u64 {
    600 // 10 minutes
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
            secure_cookies: false,
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            http_timeout_seconds: default_http_timeout(),
            pending_ttl_seconds: default_pending_ttl(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        let config_path = std::env::var("OAUTH2_LAB_CONFIG_FILE")
            .unwrap_or_else(|_| "oauth2-lab.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            info!("Loading configuration from {}", config_path);
            builder = builder.add_source(File::with_name(&config_path));
        } else {
            debug!("No config file found at {}, using defaults", config_path);
        }

        builder = builder.add_source(
            Environment::with_prefix("OAUTH2_LAB")
                .separator("__") // e.g. OAUTH2_LAB__SERVER__PORT
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut settings: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;

        Ok(settings)
    }

    /// Apply the legacy direct variables
    pub(crate) fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            info!("Using PORT environment variable");
            self.server.port = port.parse().context("Invalid PORT value")?;
        }

        for (preset, prefix) in [
            (ProviderPreset::Google, "GOOGLE"),
            (ProviderPreset::GitHub, "GITHUB"),
        ] {
            let client_id = lookup(&format!("{}_CLIENT_ID", prefix));
            let client_secret = lookup(&format!("{}_CLIENT_SECRET", prefix));
            if client_id.is_none() && client_secret.is_none() {
                continue;
            }

            let settings = self.provider_settings_mut(preset).get_or_insert_with(Default::default);
            if let Some(client_id) = client_id {
                settings.client_id = client_id;
            }
            if client_secret.is_some() {
                settings.client_secret = client_secret;
            }
        }

        if let Some(log_level) = lookup("RUST_LOG") {
            self.logging.level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.oauth.http_timeout_seconds == 0 {
            anyhow::bail!("HTTP timeout must be greater than 0");
        }

        if self.oauth.pending_ttl_seconds == 0 {
            anyhow::bail!("Pending authorization TTL must be greater than 0");
        }

        if let Some(public_url) = &self.server.public_url {
            if !public_url.starts_with("http://") && !public_url.starts_with("https://") {
                anyhow::bail!("Public URL '{}' must be an http(s) URL", public_url);
            }
        }

        // A full filter string is passed to EnvFilter as-is
        let level = self.logging.level.to_lowercase();
        let is_filter = level.contains('=') || level.contains(',');
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !is_filter && !valid_levels.contains(&level.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        let valid_formats = ["pretty", "json", "compact"];
        let format_lower = self.logging.format.to_lowercase();
        if !valid_formats.contains(&format_lower.as_str()) {
            anyhow::bail!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            );
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::from((self.server.host, self.server.port))
    }

    /// Base URL the browser reaches the server on
    pub fn base_url(&self) -> String {
        match &self.server.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.server.port),
        }
    }

    /// Get the log filter string for tracing
    pub fn log_filter(&self) -> String {
        if self.logging.level.contains('=') || self.logging.level.contains(',') {
            self.logging.level.clone()
        } else {
            format!(
                "oauth2_lab_server={},oauth2_lab_client={},tower_http={},warn",
                self.logging.level, self.logging.level, self.logging.level
            )
        }
    }

    pub fn oauth2_config(&self) -> OAuth2Config {
        OAuth2Config::new()
            .with_http_timeout(self.oauth.http_timeout_seconds)
            .with_pending_ttl(self.oauth.pending_ttl_seconds)
    }

    /// Credentials per preset, in the form the provider registry loads
    pub fn provider_credentials(&self) -> Vec<(ProviderPreset, Option<ProviderCredentials>)> {
        ProviderPreset::ALL
            .iter()
            .map(|&preset| {
                let credentials = self
                    .provider_settings(preset)
                    .map(|settings| ProviderCredentials {
                        client_id: settings.client_id.clone(),
                        client_secret: settings.client_secret.clone(),
                        redirect_uri: settings.redirect_uri.clone().unwrap_or_default(),
                    });
                (preset, credentials)
            })
            .collect()
    }

    fn provider_settings(&self, preset: ProviderPreset) -> Option<&ProviderSettings> {
        match preset {
            ProviderPreset::Google => self.providers.google.as_ref(),
            ProviderPreset::GitHub => self.providers.github.as_ref(),
        }
    }

    fn provider_settings_mut(&mut self, preset: ProviderPreset) -> &mut Option<ProviderSettings> {
        match preset {
            ProviderPreset::Google => &mut self.providers.google,
            ProviderPreset::GitHub => &mut self.providers.github,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.oauth.http_timeout_seconds, 10);
        assert_eq!(config.oauth.pending_ttl_seconds, 600);
        assert_eq!(config.base_url(), "http://localhost:3000");
        assert!(!config.server.secure_cookies);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        config.server.port = 3000;
        config.oauth.http_timeout_seconds = 0;
        assert!(config.validate().is_err());

        config.oauth.http_timeout_seconds = 10;
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        config.logging.format = "json".to_string();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "oauth2_lab_server=debug,warn".to_string();
        assert!(config.validate().is_ok());

        config.server.public_url = Some("localhost:3000".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_legacy_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup_from(&[
                ("PORT", "8080"),
                ("GOOGLE_CLIENT_ID", "google-id"),
                ("GOOGLE_CLIENT_SECRET", "google-secret"),
                ("GITHUB_CLIENT_ID", "github-id"),
                ("RUST_LOG", "debug"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.level, "debug");

        let google = config.providers.google.as_ref().unwrap();
        assert_eq!(google.client_id, "google-id");
        assert_eq!(google.client_secret.as_deref(), Some("google-secret"));

        let github = config.providers.github.as_ref().unwrap();
        assert_eq!(github.client_id, "github-id");
        assert!(github.client_secret.is_none());
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = Config::default();
        let result = config.apply_overrides(lookup_from(&[("PORT", "not-a-port")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_provider_credentials() {
        let mut config = Config::default();
        config.server.public_url = Some("https://lab.example.com/".to_string());
        config.providers.github = Some(ProviderSettings {
            client_id: "github-id".to_string(),
            client_secret: Some("github-secret".to_string()),
            redirect_uri: Some("https://lab.example.com/gh".to_string()),
        });

        assert_eq!(config.base_url(), "https://lab.example.com");

        let credentials = config.provider_credentials();
        assert_eq!(credentials.len(), 2);

        let (_, google) = credentials
            .iter()
            .find(|(preset, _)| *preset == ProviderPreset::Google)
            .unwrap();
        assert!(google.is_none());

        let (_, github) = credentials
            .iter()
            .find(|(preset, _)| *preset == ProviderPreset::GitHub)
            .unwrap();
        let github = github.as_ref().unwrap();
        assert_eq!(github.client_id, "github-id");
        assert_eq!(github.redirect_uri, "https://lab.example.com/gh");
    }

    #[test]
    fn test_log_filter() {
        let mut config = Config::default();
        assert!(config.log_filter().starts_with("oauth2_lab_server=info"));

        config.logging.level = "trace,hyper=info".to_string();
        assert_eq!(config.log_filter(), "trace,hyper=info");
    }

    #[test]
    fn test_provider_settings_debug_redacts_secret() {
        let settings = ProviderSettings {
            client_id: "id".to_string(),
            client_secret: Some("super-secret".to_string()),
            redirect_uri: None,
        };
        assert!(!format!("{:?}", settings).contains("super-secret"));
    }
}
