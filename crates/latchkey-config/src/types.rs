//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [oauth]      # provider endpoints and client registration
//! [storage]    # where the session is persisted
//! [logging]    # log file output
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Environment variable that supplies the OAuth client secret.
pub const CLIENT_SECRET_ENV: &str = "LATCHKEY_CLIENT_SECRET";

const REDACTED: &str = "<redacted>";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LatchkeyConfig {
    /// OAuth provider and client registration.
    pub oauth: Option<OAuthSection>,

    /// Session persistence.
    pub storage: Option<StorageSection>,

    /// Log output.
    pub logging: Option<LoggingSection>,
}

impl LatchkeyConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Copy with secrets replaced, safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(oauth) = copy.oauth.as_mut()
            && oauth.has_plaintext_secret()
        {
            oauth.client_secret = Some(REDACTED.to_string());
        }
        copy
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole, not field by field.
    pub fn merge(&mut self, other: LatchkeyConfig) {
        if other.oauth.is_some() {
            self.oauth = other.oauth;
        }
        if other.storage.is_some() {
            self.storage = other.storage;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// The `[oauth]` section, or an error naming what is missing.
    pub fn require_oauth(&self) -> Result<&OAuthSection> {
        self.oauth.as_ref().ok_or_else(|| ConfigError::MissingField {
            field: "oauth".to_string(),
            context: "config (add an [oauth] section)".to_string(),
        })
    }

    pub fn storage(&self) -> StorageSection {
        self.storage.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingSection {
        self.logging.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OAuth Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// OAuth provider and client registration.
///
/// ```toml
/// [oauth]
/// client_id = "1234.apps.example.com"
/// redirect_uri = "http://127.0.0.1:5000/callback"
/// scopes = ["read_write"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSection {
    pub client_id: Option<String>,
    /// Prefer the `LATCHKEY_CLIENT_SECRET` environment variable.
    pub client_secret: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    /// Loopback redirect registered with the provider. Port 0 = ephemeral.
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub callback_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub refresh_margin_secs: u64,
}

impl Default for OAuthSection {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            redirect_uri: "http://127.0.0.1:0/callback".to_string(),
            scopes: Vec::new(),
            callback_timeout_secs: 300,
            request_timeout_secs: 30,
            refresh_margin_secs: 60,
        }
    }
}

impl OAuthSection {
    /// The configured client ID; required for any token operation.
    pub fn require_client_id(&self) -> Result<&str> {
        self.client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                field: "client_id".to_string(),
                context: "[oauth]".to_string(),
            })
    }

    /// Check values that would only fail later at runtime.
    pub fn validate(&self) -> Result<()> {
        self.require_client_id()?;
        if self.callback_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "callback_timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if !self.redirect_uri.starts_with("http://") {
            return Err(ConfigError::InvalidValue {
                field: "redirect_uri".to_string(),
                reason: "must be a loopback http:// URI".to_string(),
            });
        }
        Ok(())
    }

    pub fn has_plaintext_secret(&self) -> bool {
        self.client_secret.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Resolve the client secret: environment first, then config file.
    pub fn resolve_client_secret(&self) -> Option<ResolvedSecret> {
        self.resolve_client_secret_with(std::env::var(CLIENT_SECRET_ENV).ok())
    }

    fn resolve_client_secret_with(&self, env_value: Option<String>) -> Option<ResolvedSecret> {
        if let Some(value) = env_value.filter(|v| !v.is_empty()) {
            return Some(ResolvedSecret {
                value,
                source: SecretSource::EnvVar(CLIENT_SECRET_ENV.to_string()),
            });
        }
        self.client_secret
            .clone()
            .filter(|v| !v.is_empty())
            .map(|value| ResolvedSecret {
                value,
                source: SecretSource::ConfigFile,
            })
    }
}

/// Result of secret resolution with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Environment variable.
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Which secure storage backend holds the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// OS keyring (requires the `keyring` feature).
    Keyring,
    /// Owner-only JSON file.
    #[default]
    File,
    /// Nothing persisted; the session ends with the process.
    Memory,
}

/// Session persistence settings.
///
/// ```toml
/// [storage]
/// backend = "file"
/// path = "/home/me/.config/latchkey/tokens.json"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackend,
    /// File backend location. Default: `<config dir>/tokens.json`.
    pub path: Option<PathBuf>,
    /// Keyring service name.
    pub service: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: None,
            service: "latchkey".to_string(),
        }
    }
}

impl StorageSection {
    /// File backend path, defaulting into `config_dir`.
    pub fn effective_path(&self, config_dir: &Path) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| config_dir.join("tokens.json"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Log file settings. Console verbosity is controlled by `-v`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Write JSON logs to a daily-rotated file.
    pub file: bool,
    /// Log directory. Default: `<config dir>/logs`.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            file: true,
            directory: None,
        }
    }
}
