//! Token endpoint client: code exchange and refresh.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{ExchangeError, OAuthError, Result};
use crate::oauth::OAuthConfig;
use crate::token::TokenResponse;

pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

/// The provider's token endpoint.
///
/// Implementations never mutate session state; the caller folds a successful
/// response into the [`TokenRecord`](crate::token::TokenRecord).
#[async_trait]
pub trait TokenEndpoint: Send + Sync + std::fmt::Debug {
    /// `grant_type=authorization_code`
    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> ExchangeResult<TokenResponse>;

    /// `grant_type=refresh_token`
    async fn refresh(&self, refresh_token: &str) -> ExchangeResult<TokenResponse>;
}

pub type SharedTokenEndpoint = Arc<dyn TokenEndpoint>;

/// Form-encoded POSTs against a real token endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenClient {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
}

impl HttpTokenClient {
    pub fn new(config: &OAuthConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| OAuthError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(http, config))
    }

    /// Use a preconfigured reqwest client.
    pub fn with_client(http: Client, config: &OAuthConfig) -> Self {
        Self {
            http,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    fn credentials(&self) -> Vec<(&'static str, &str)> {
        let mut form = vec![("client_id", self.client_id.as_str())];
        if let Some(secret) = self.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        form
    }

    async fn post_form(&self, grant: &str, form: &[(&str, &str)]) -> ExchangeResult<TokenResponse> {
        let response = self
            .http
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(grant, error = %e, "Token request failed before a response");
                ExchangeError::Transport(e.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            tracing::warn!(grant, %status, error = %e, "Failed to read token response body");
            ExchangeError::Transport(e.to_string())
        })?;

        if !status.is_success() {
            tracing::error!(grant, %status, body = %body, "Token endpoint returned an error");
            return Err(ExchangeError::from_status(status, body));
        }

        let tokens: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(grant, %status, body = %body, "Failed to parse token response");
            ExchangeError::Malformed(e.to_string())
        })?;

        if tokens.access_token.is_empty() {
            tracing::error!(grant, %status, body = %body, "Token response has no access_token");
            return Err(ExchangeError::Malformed("missing access_token".to_string()));
        }

        tracing::debug!(grant, expires_in = tokens.expires_in, "Token endpoint succeeded");
        Ok(tokens)
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenClient {
    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> ExchangeResult<TokenResponse> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", verifier),
        ];
        form.extend(self.credentials());
        self.post_form("authorization_code", &form).await
    }

    async fn refresh(&self, refresh_token: &str) -> ExchangeResult<TokenResponse> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        form.extend(self.credentials());
        self.post_form("refresh_token", &form).await
    }
}
