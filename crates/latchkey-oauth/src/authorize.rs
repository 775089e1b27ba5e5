//! Interactive authorization: browser, loopback callback, code exchange.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::browser::{SharedBrowserLauncher, SystemBrowser};
use crate::callback::{CallbackListener, CallbackResult};
use crate::client::SharedTokenEndpoint;
use crate::error::{ExchangeError, Result};
use crate::oauth::{OAuthConfig, PkceChallenge, build_authorization_url, generate_state};
use crate::outcome::{AuthErrorCode, AuthOutcome};
use crate::token_manager::SharedTokenManager;

/// Drives one authorization-code + PKCE attempt at a time.
#[derive(Debug)]
pub struct Authenticator {
    config: OAuthConfig,
    endpoint: SharedTokenEndpoint,
    tokens: SharedTokenManager,
    browser: SharedBrowserLauncher,
    in_flight: Mutex<()>,
}

enum Wait {
    Callback(Option<CallbackResult>),
    Cancelled,
    TimedOut,
}

impl Authenticator {
    pub fn new(
        config: OAuthConfig,
        endpoint: SharedTokenEndpoint,
        tokens: SharedTokenManager,
    ) -> Self {
        Self {
            config,
            endpoint,
            tokens,
            browser: Arc::new(SystemBrowser),
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_browser(mut self, browser: SharedBrowserLauncher) -> Self {
        self.browser = browser;
        self
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Run the full flow and install the resulting tokens.
    ///
    /// Never returns an error: every failure, including unexpected ones, is
    /// folded into [`AuthOutcome::Failed`]. A second call while one is
    /// pending fails immediately.
    pub async fn authenticate(&self, cancel: &CancellationToken) -> AuthOutcome {
        let Ok(_attempt) = self.in_flight.try_lock() else {
            return AuthOutcome::failed(
                AuthErrorCode::Unknown,
                "another authorization attempt is already in progress",
            );
        };

        match self.run(cancel).await {
            Ok(outcome) => {
                if let AuthOutcome::Failed(failure) = &outcome {
                    tracing::warn!(code = %failure.code, message = %failure.message, "Authorization failed");
                }
                outcome
            }
            Err(e) => {
                tracing::error!(error = %e, "Authorization aborted by unexpected error");
                AuthOutcome::failed(AuthErrorCode::Unknown, e.to_string())
            }
        }
    }

    async fn run(&self, cancel: &CancellationToken) -> Result<AuthOutcome> {
        let pkce = PkceChallenge::generate();
        let state = generate_state();

        let mut listener = CallbackListener::bind(&self.config.redirect_uri, state.clone()).await?;
        let redirect_uri = listener.redirect_uri().to_string();
        let auth_url = build_authorization_url(&self.config, &redirect_uri, &pkce, &state);

        if let Err(e) = self.browser.open(&auth_url) {
            tracing::warn!(error = %e, url = %auth_url, "Could not open browser; open the URL manually");
        }
        tracing::info!(addr = %listener.local_addr(), "Waiting for OAuth callback");

        let waited = tokio::select! {
            result = listener.wait() => Wait::Callback(result),
            _ = cancel.cancelled() => Wait::Cancelled,
            _ = tokio::time::sleep(self.config.callback_timeout) => Wait::TimedOut,
        };
        listener.shutdown().await;

        let code = match waited {
            Wait::Callback(Some(CallbackResult::Code(code))) => code,
            Wait::Callback(Some(CallbackResult::Failed(failure))) => {
                return Ok(AuthOutcome::Failed(failure));
            }
            Wait::Callback(None) => {
                return Ok(AuthOutcome::failed(
                    AuthErrorCode::Unknown,
                    "callback listener stopped before a redirect arrived",
                ));
            }
            Wait::Cancelled => {
                return Ok(AuthOutcome::failed(
                    AuthErrorCode::Cancelled,
                    "authorization cancelled while waiting for the browser",
                ));
            }
            Wait::TimedOut => {
                return Ok(AuthOutcome::failed(
                    AuthErrorCode::Timeout,
                    format!(
                        "no callback within {}s",
                        self.config.callback_timeout.as_secs()
                    ),
                ));
            }
        };

        tracing::debug!("Authorization code received, exchanging for tokens");
        let exchanged = tokio::select! {
            result = self.endpoint.exchange_code(&code, &pkce.verifier, &redirect_uri) => result,
            _ = cancel.cancelled() => Err(ExchangeError::Cancelled),
        };

        match exchanged {
            Ok(response) => {
                self.tokens.install(&response).await;
                tracing::info!("Authorization succeeded");
                Ok(AuthOutcome::Succeeded)
            }
            Err(ExchangeError::Cancelled) => Ok(AuthOutcome::failed(
                AuthErrorCode::Cancelled,
                "authorization cancelled during token exchange",
            )),
            Err(e) => Ok(AuthOutcome::failed(
                AuthErrorCode::TokenExchangeFailed,
                e.to_string(),
            )),
        }
    }
}
