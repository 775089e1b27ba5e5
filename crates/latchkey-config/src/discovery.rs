//! Locating and layering config files.
//!
//! Two layers, later wins section by section:
//! 1. `<config dir>/config.toml` (user)
//! 2. `<project dir>/latchkey.toml` (project-local)

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{ConfigError, LatchkeyConfig, Result};

const USER_CONFIG_FILE: &str = "config.toml";
const PROJECT_CONFIG_FILE: &str = "latchkey.toml";
const CONFIG_DIR_ENV: &str = "LATCHKEY_CONFIG_DIR";

/// Which layer a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    User,
    Project,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::User => write!(f, "user"),
            LayerKind::Project => write!(f, "project"),
        }
    }
}

/// What happened when a layer was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerStatus {
    Loaded,
    Missing,
    /// The file exists but could not be used; it contributed nothing.
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub kind: LayerKind,
    pub path: PathBuf,
    pub status: LayerStatus,
}

/// Merged configuration plus how it was assembled.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: LatchkeyConfig,
    /// Layers in merge order (lowest priority first).
    pub layers: Vec<ConfigLayer>,
    pub warnings: Vec<String>,
}

/// Read and merge the user layer from `config_dir` and the project layer
/// from `project_dir`.
///
/// Never fails: unreadable or unparsable layers are skipped and reported in
/// [`LoadedConfig::warnings`].
pub fn load_config(config_dir: &Path, project_dir: &Path) -> LoadedConfig {
    let mut loaded = LoadedConfig {
        config: LatchkeyConfig::new(),
        layers: Vec::with_capacity(2),
        warnings: Vec::new(),
    };

    for (kind, path) in [
        (LayerKind::User, config_dir.join(USER_CONFIG_FILE)),
        (LayerKind::Project, project_dir.join(PROJECT_CONFIG_FILE)),
    ] {
        let status = if path.is_file() {
            match read_config_file(&path) {
                Ok(layer) => {
                    loaded.config.merge(layer);
                    LayerStatus::Loaded
                }
                Err(e) => {
                    loaded
                        .warnings
                        .push(format!("Ignoring {} config {}: {}", kind, path.display(), e));
                    LayerStatus::Invalid(e.to_string())
                }
            }
        } else {
            LayerStatus::Missing
        };
        loaded.layers.push(ConfigLayer { kind, path, status });
    }

    if loaded
        .config
        .oauth
        .as_ref()
        .is_some_and(|oauth| oauth.has_plaintext_secret())
    {
        loaded.warnings.push(format!(
            "client_secret is stored in plaintext; prefer the {} environment variable",
            crate::CLIENT_SECRET_ENV
        ));
    }

    loaded
}

fn read_config_file(path: &Path) -> Result<LatchkeyConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    LatchkeyConfig::from_toml(&contents)
}

/// Default config directory: `LATCHKEY_CONFIG_DIR` if set, else the
/// platform config dir.
pub fn default_config_dir() -> Option<PathBuf> {
    std::env::var_os(CONFIG_DIR_ENV)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| dirs::config_dir().map(|d| d.join("latchkey")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageBackend;
    use tempfile::tempdir;

    #[test]
    fn test_project_layer_wins() {
        let user = tempdir().unwrap();
        let project = tempdir().unwrap();
        std::fs::write(
            user.path().join(USER_CONFIG_FILE),
            "[oauth]\nclient_id = \"user\"\n\n[storage]\nbackend = \"memory\"\n",
        )
        .unwrap();
        std::fs::write(
            project.path().join(PROJECT_CONFIG_FILE),
            "[oauth]\nclient_id = \"project\"\n",
        )
        .unwrap();

        let loaded = load_config(user.path(), project.path());
        assert!(loaded.layers.iter().all(|l| l.status == LayerStatus::Loaded));
        assert_eq!(loaded.layers[0].kind, LayerKind::User);
        assert_eq!(
            loaded.config.oauth.unwrap().client_id.as_deref(),
            Some("project")
        );
        assert_eq!(loaded.config.storage.unwrap().backend, StorageBackend::Memory);
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_missing_files() {
        let user = tempdir().unwrap();
        let project = tempdir().unwrap();
        let loaded = load_config(user.path(), project.path());
        assert_eq!(loaded.layers.len(), 2);
        assert!(loaded.layers.iter().all(|l| l.status == LayerStatus::Missing));
        assert!(loaded.config.oauth.is_none());
    }

    #[test]
    fn test_broken_layer_is_skipped() {
        let user = tempdir().unwrap();
        let project = tempdir().unwrap();
        std::fs::write(user.path().join(USER_CONFIG_FILE), "[oauth\nbroken").unwrap();
        std::fs::write(
            project.path().join(PROJECT_CONFIG_FILE),
            "[oauth]\nclient_id = \"project\"\n",
        )
        .unwrap();

        let loaded = load_config(user.path(), project.path());
        assert!(matches!(loaded.layers[0].status, LayerStatus::Invalid(_)));
        assert_eq!(loaded.layers[1].status, LayerStatus::Loaded);
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].starts_with("Ignoring user config"));
        assert!(loaded.config.oauth.is_some());
    }

    #[test]
    fn test_plaintext_secret_warning() {
        let user = tempdir().unwrap();
        let project = tempdir().unwrap();
        std::fs::write(
            user.path().join(USER_CONFIG_FILE),
            "[oauth]\nclient_id = \"abc\"\nclient_secret = \"shh\"\n",
        )
        .unwrap();

        let loaded = load_config(user.path(), project.path());
        assert!(loaded.warnings.iter().any(|w| w.contains("plaintext")));
    }
}
