//! Configuration system for the latchkey credential broker.
//!
//! Provides TOML-based configuration with:
//! - OAuth provider/client registration (`[oauth]`)
//! - Session storage backend selection (`[storage]`)
//! - Log file settings (`[logging]`)
//! - Config file layering (user config dir + project-local overrides)
//! - Client secret resolution (env var → config file)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigLayer, LayerKind, LayerStatus, LoadedConfig, default_config_dir, load_config,
};
pub use error::{ConfigError, Result};
pub use types::*;
