//! Token data: wire response, in-memory record, display info.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body returned by the token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// The broker's one piece of mutable session state.
///
/// Updated in place on refresh; cleared wholesale when the session dies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub access_expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    /// When the current access token was received. Only known for tokens
    /// obtained by this process; never persisted.
    pub issued_at: Option<DateTime<Utc>>,
}

impl TokenRecord {
    /// Build a fresh record from a token response received at `now`.
    pub fn from_response(response: &TokenResponse, now: DateTime<Utc>) -> Self {
        let mut record = Self::default();
        record.apply(response, now);
        record
    }

    /// Fold a token response into this record.
    ///
    /// Expiry is always `now + expires_in`. A response without a refresh
    /// token keeps the one already held.
    pub fn apply(&mut self, response: &TokenResponse, now: DateTime<Utc>) {
        self.access_token = response.access_token.clone();
        if let Some(refresh) = response.refresh_token.as_ref().filter(|r| !r.is_empty()) {
            self.refresh_token = Some(refresh.clone());
        }
        let expires_in = response.expires_in.min(i32::MAX as u64) as i64;
        self.access_expires_at = Some(now + chrono::Duration::seconds(expires_in));
        self.issued_at = Some(now);
        if response.scope.is_some() {
            self.scope = response.scope.clone();
        }
    }

    /// Whether the access token can be handed out without refreshing.
    ///
    /// A token issued with a lifetime shorter than twice the margin uses
    /// half its lifetime as the margin instead, so it is handed out for a
    /// while rather than refreshed again on every call.
    pub fn is_usable(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        let Some(expires_at) = self.access_expires_at else {
            return false;
        };
        let mut margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::zero());
        if let Some(issued_at) = self.issued_at {
            margin = margin.min((expires_at - issued_at) / 2);
        }
        expires_at - margin > now
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|r| !r.is_empty())
    }

    /// Whether there is anything to keep: an access or refresh token.
    pub fn is_empty(&self) -> bool {
        self.access_token.is_empty() && !self.has_refresh_token()
    }

    /// Reset every field.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Information about the current session for display.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub expires_in_secs: u64,
    pub is_expired: bool,
    pub has_refresh_token: bool,
    pub scope: Option<String>,
    pub masked_token: String,
}

impl TokenInfo {
    pub(crate) fn from_record(record: &TokenRecord, now: DateTime<Utc>, margin: Duration) -> Self {
        let expires_in_secs = record
            .access_expires_at
            .map(|at| (at - now).num_seconds().max(0) as u64)
            .unwrap_or(0);
        Self {
            expires_in_secs,
            is_expired: !record.is_usable(now, margin),
            has_refresh_token: record.has_refresh_token(),
            scope: record.scope.clone(),
            masked_token: mask_token(&record.access_token),
        }
    }

    pub fn expires_in_display(&self) -> String {
        if self.is_expired {
            "Expired (will refresh on next use)".to_string()
        } else {
            let hours = self.expires_in_secs / 3600;
            let minutes = (self.expires_in_secs % 3600) / 60;
            format!("{}h {}m", hours, minutes)
        }
    }
}

/// Show only the ends of a secret.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "****".to_string()
    }
}
