//! Session ownership and single-flight refresh.
//!
//! [`TokenManager`] owns the one [`TokenRecord`], restores it from storage on
//! startup, and hands out access tokens. When the token is inside the safety
//! margin, exactly one caller refreshes it while the others wait on the
//! refresh gate and share that call's result.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex as SyncMutex, RwLock};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::client::SharedTokenEndpoint;
use crate::error::{ExchangeError, Result};
use crate::storage::{SharedStorage, TokenStore};
use crate::token::{TokenInfo, TokenRecord, TokenResponse};

/// Result of the latest refresh, install or sign-out.
#[derive(Debug, Default)]
struct Published {
    generation: u64,
    token: Option<String>,
}

#[derive(Debug)]
pub struct TokenManager {
    record: RwLock<TokenRecord>,
    /// Held for the whole check-refresh-update sequence.
    refresh_gate: Mutex<()>,
    /// Written before the gate is released, so callers that queued behind a
    /// refresh return its result instead of starting another one.
    published: SyncMutex<Published>,
    endpoint: SharedTokenEndpoint,
    store: TokenStore,
    margin: Duration,
}

impl TokenManager {
    /// Create a manager, restoring any persisted session.
    ///
    /// Access tokens are refreshed once they are within `margin` of expiry.
    /// A store that cannot be read is treated as holding no session; the
    /// next install or sign-out overwrites it.
    pub fn new(endpoint: SharedTokenEndpoint, storage: SharedStorage, margin: Duration) -> Self {
        let store = TokenStore::new(storage);
        let record = match store.load() {
            Ok(record) => {
                if !record.is_empty() {
                    tracing::debug!(
                        has_refresh_token = record.has_refresh_token(),
                        "Restored persisted session"
                    );
                }
                record
            }
            Err(e) => {
                tracing::warn!(error = %e, "Persisted session is unreadable; starting signed out");
                TokenRecord::default()
            }
        };

        Self {
            record: RwLock::new(record),
            refresh_gate: Mutex::new(()),
            published: SyncMutex::new(Published::default()),
            endpoint,
            store,
            margin,
        }
    }

    /// Return a usable access token, refreshing it if needed.
    ///
    /// `None` means there is no session, the refresh token was rejected (the
    /// session is now cleared), a transient failure occurred (the stale
    /// session is kept for a later retry), or `cancel` fired.
    pub async fn get_access_token(&self, cancel: &CancellationToken) -> Option<String> {
        if let Some(token) = self.usable_token() {
            return Some(token);
        }

        let observed = self.published.lock().generation;
        let _gate = tokio::select! {
            guard = self.refresh_gate.lock() => guard,
            _ = cancel.cancelled() => {
                tracing::debug!("Cancelled while waiting for in-flight refresh");
                return None;
            }
        };

        {
            let published = self.published.lock();
            if published.generation != observed {
                tracing::debug!(
                    success = published.token.is_some(),
                    "Sharing result of the refresh that finished while waiting"
                );
                return published.token.clone();
            }
        }
        if let Some(token) = self.usable_token() {
            return Some(token);
        }

        let refresh_token = self.record.read().refresh_token.clone();
        let Some(refresh_token) = refresh_token.filter(|t| !t.is_empty()) else {
            tracing::debug!("No refresh token available; re-authentication required");
            return None;
        };

        tracing::info!("Access token expired or expiring, refreshing");
        let result = tokio::select! {
            result = self.endpoint.refresh(&refresh_token) => result,
            _ = cancel.cancelled() => Err(ExchangeError::Cancelled),
        };

        let token = match result {
            Ok(response) => {
                let token = self.apply_response(&response);
                tracing::info!(expires_in = response.expires_in, "Token refreshed successfully");
                Some(token)
            }
            Err(ExchangeError::Cancelled) => {
                // Nothing published: waiters retry with their own signal.
                tracing::debug!("Refresh cancelled; session left untouched");
                return None;
            }
            Err(e) if e.is_invalid_grant() => {
                tracing::warn!(error = %e, "Refresh token rejected; clearing session");
                self.clear_session();
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Transient refresh failure; keeping session for retry");
                None
            }
        };

        self.publish(token.clone());
        token
    }

    /// Install tokens from a completed authorization-code exchange.
    pub async fn install(&self, response: &TokenResponse) {
        let _gate = self.refresh_gate.lock().await;
        let token = {
            let mut record = self.record.write();
            record.clear();
            record.apply(response, Utc::now());
            record.access_token.clone()
        };
        self.persist();
        self.publish(Some(token));
        tracing::info!(expires_in = response.expires_in, "Session established");
    }

    /// Forget the session locally and in storage.
    pub async fn sign_out(&self) -> Result<()> {
        let _gate = self.refresh_gate.lock().await;
        self.record.write().clear();
        self.publish(None);
        self.store.erase()?;
        tracing::info!("Signed out");
        Ok(())
    }

    /// Whether anything is held that could yield an access token.
    pub fn has_session(&self) -> bool {
        !self.record.read().is_empty()
    }

    /// Whether the held access token is usable right now.
    pub fn is_usable(&self) -> bool {
        self.record.read().is_usable(Utc::now(), self.margin)
    }

    pub fn token_info(&self) -> Option<TokenInfo> {
        let record = self.record.read();
        if record.is_empty() {
            return None;
        }
        Some(TokenInfo::from_record(&record, Utc::now(), self.margin))
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> TokenRecord {
        self.record.read().clone()
    }

    fn usable_token(&self) -> Option<String> {
        let record = self.record.read();
        record
            .is_usable(Utc::now(), self.margin)
            .then(|| record.access_token.clone())
    }

    fn publish(&self, token: Option<String>) {
        let mut published = self.published.lock();
        published.generation += 1;
        published.token = token;
    }

    fn apply_response(&self, response: &TokenResponse) -> String {
        let token = {
            let mut record = self.record.write();
            record.apply(response, Utc::now());
            record.access_token.clone()
        };
        self.persist();
        token
    }

    fn persist(&self) {
        let snapshot = self.record.read().clone();
        if let Err(e) = self.store.save(&snapshot) {
            tracing::error!(error = %e, "Failed to persist session; it will not survive restart");
        }
    }

    fn clear_session(&self) {
        self.record.write().clear();
        if let Err(e) = self.store.erase() {
            tracing::error!(error = %e, "Failed to remove persisted session");
        }
    }
}

/// Shared token manager for use across async contexts.
pub type SharedTokenManager = Arc<TokenManager>;
