//! CLI command handlers.

pub mod auth;
pub mod config;
pub mod token;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use latchkey_config::{ConfigLayer, LatchkeyConfig, OAuthSection, StorageBackend};
use latchkey_oauth::{
    FileStorage, HttpTokenClient, MemoryStorage, OAuthConfig, SharedStorage, TokenManager,
};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Directory holding config, logs and the default token file.
    pub config_dir: PathBuf,
    /// Merged configuration.
    pub config: LatchkeyConfig,
    /// Config files consulted, in merge order.
    pub layers: Vec<ConfigLayer>,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// The `[oauth]` section, or defaults when none is configured.
    fn oauth_section(&self) -> OAuthSection {
        self.config.oauth.clone().unwrap_or_default()
    }

    /// Runtime OAuth config. With `require_client` the section must be
    /// complete enough to talk to the provider.
    pub fn oauth_config(&self, require_client: bool) -> Result<OAuthConfig> {
        let section = self.oauth_section();
        if require_client {
            self.config
                .require_oauth()
                .and_then(|oauth| oauth.validate())
                .context("OAuth is not configured; set client_id under [oauth] in config.toml")?;
        }

        let mut config = OAuthConfig::new(
            section.client_id.clone().unwrap_or_default(),
            section.authorize_url.clone(),
            section.token_url.clone(),
            section.redirect_uri.clone(),
        )
        .with_scopes(section.scopes.clone())
        .with_callback_timeout(Duration::from_secs(section.callback_timeout_secs))
        .with_request_timeout(Duration::from_secs(section.request_timeout_secs))
        .with_refresh_margin(Duration::from_secs(section.refresh_margin_secs));

        if let Some(secret) = section.resolve_client_secret() {
            tracing::debug!(source = %secret.source, "Resolved OAuth client secret");
            config = config.with_client_secret(secret.value);
        }
        Ok(config)
    }

    /// Storage backend selected by `[storage]`.
    pub fn storage(&self) -> Result<SharedStorage> {
        let section = self.config.storage();
        match section.backend {
            StorageBackend::File => Ok(Arc::new(FileStorage::new(
                section.effective_path(&self.config_dir),
            ))),
            StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
            StorageBackend::Keyring => keyring_storage(&section.service),
        }
    }

    /// Token manager over the configured storage and endpoint.
    pub fn token_manager(&self, config: &OAuthConfig) -> Result<Arc<TokenManager>> {
        let endpoint = Arc::new(HttpTokenClient::new(config)?);
        let manager = TokenManager::new(endpoint, self.storage()?, config.refresh_margin);
        Ok(Arc::new(manager))
    }
}

#[cfg(feature = "keyring")]
fn keyring_storage(service: &str) -> Result<SharedStorage> {
    Ok(Arc::new(latchkey_oauth::KeyringStorage::new(service)))
}

#[cfg(not(feature = "keyring"))]
fn keyring_storage(_service: &str) -> Result<SharedStorage> {
    anyhow::bail!("keyring support not compiled in (rebuild with the 'keyring' feature)")
}
