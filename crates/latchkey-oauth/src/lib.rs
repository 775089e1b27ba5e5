//! OAuth 2.0 authorization-code + PKCE credential broker for desktop apps.
//!
//! Obtains delegated access to a resource API through the system browser and
//! a loopback redirect, then keeps the access token fresh for any number of
//! concurrent callers.
//!
//! # Components
//!
//! - [`oauth`]: provider config, PKCE pair, state nonce, authorization URL
//! - [`callback`]: loopback listener that receives the redirect
//! - [`browser`]: `BrowserLauncher` capability and the system implementation
//! - [`authorize`]: the interactive flow, start to installed tokens
//! - [`client`]: token endpoint: code exchange and refresh
//! - [`token_manager`]: session ownership and single-flight refresh
//! - [`storage`]: secure key/value persistence backends
//! - [`outcome`]: OAuth error taxonomy and user-facing messages

pub mod authorize;
pub mod browser;
pub mod callback;
pub mod client;
pub mod error;
pub mod oauth;
pub mod outcome;
pub mod storage;
pub mod token;
pub mod token_manager;

pub use authorize::Authenticator;
pub use browser::{BrowserLauncher, SharedBrowserLauncher, SystemBrowser};
pub use client::{HttpTokenClient, SharedTokenEndpoint, TokenEndpoint};
pub use error::{ExchangeError, OAuthError, Result, StorageError};
pub use oauth::{OAuthConfig, PkceChallenge};
pub use outcome::{AuthErrorCode, AuthFailure, AuthOutcome, classify};
#[cfg(feature = "keyring")]
pub use storage::KeyringStorage;
pub use storage::{FileStorage, MemoryStorage, SecureStorage, SharedStorage};
pub use token::{TokenInfo, TokenRecord, TokenResponse};
pub use token_manager::{SharedTokenManager, TokenManager};
pub use tokio_util::sync::CancellationToken;
