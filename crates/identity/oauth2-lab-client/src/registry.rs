//! Immutable registry of configured providers.

use crate::config::ProviderConfig;
use crate::error::{OAuth2Error, OAuth2Result};
use crate::variants::{ProviderCredentials, ProviderPreset};
use std::collections::HashMap;
use tracing::{info, warn};

/// Provider name to descriptor mapping, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderConfig>,
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Register presets whose credentials are present and complete.
    ///
    /// `credentials` maps a preset to its client id, optional secret and
    /// optional redirect URI override. Without an override the redirect URI
    /// is `{base_url}/callback/{name}`. Presets with missing credentials are
    /// skipped with a warning.
    pub fn from_credentials<I>(base_url: &str, credentials: I) -> OAuth2Result<Self>
    where
        I: IntoIterator<Item = (ProviderPreset, Option<ProviderCredentials>)>,
    {
        let base_url = base_url.trim_end_matches('/');
        let mut builder = Self::builder();

        for (preset, creds) in credentials {
            let Some(mut creds) = creds else {
                warn!("Provider {} not configured, skipping", preset);
                continue;
            };

            if creds.client_id.trim().is_empty() {
                warn!("Provider {} has no client id, skipping", preset);
                continue;
            }

            let has_secret = creds
                .client_secret
                .as_deref()
                .is_some_and(|secret| !secret.is_empty());
            if preset.requires_client_secret() && !has_secret {
                warn!("Provider {} requires a client secret, skipping", preset);
                continue;
            }

            if creds.redirect_uri.trim().is_empty() {
                creds.redirect_uri = format!("{}/callback/{}", base_url, preset.name());
            }

            builder = builder.register(preset.descriptor(creds))?;
        }

        Ok(builder.build())
    }

    pub fn get(&self, name: &str) -> OAuth2Result<&ProviderConfig> {
        self.providers
            .get(name)
            .ok_or_else(|| OAuth2Error::InvalidProvider(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered provider names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }
}

#[derive(Debug, Default)]
pub struct ProviderRegistryBuilder {
    providers: HashMap<String, ProviderConfig>,
}

impl ProviderRegistryBuilder {
    /// Validate and add a provider. Names must be unique.
    pub fn register(mut self, config: ProviderConfig) -> OAuth2Result<Self> {
        config.validate()?;

        if self.providers.contains_key(&config.name) {
            return Err(OAuth2Error::Config(format!(
                "Provider '{}' registered twice",
                config.name
            )));
        }

        info!("Registered OAuth2 provider: {}", config.name);
        self.providers.insert(config.name.clone(), config);
        Ok(self)
    }

    pub fn build(self) -> ProviderRegistry {
        ProviderRegistry {
            providers: self.providers,
        }
    }
}
