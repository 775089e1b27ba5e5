//! Authentication outcomes and the OAuth error taxonomy.
//!
//! Every way an authorization attempt can end is folded into [`AuthOutcome`].
//! Failures carry an [`AuthErrorCode`] from a closed set, the raw diagnostic
//! message, and a message fit to show the user as-is.

use std::fmt;

/// Closed set of reasons an authorization attempt can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    /// The user declined consent.
    AccessDenied,
    /// The OAuth client is limited to users of its own organization.
    OrgInternal,
    /// Client authentication failed.
    InvalidClient,
    /// The authorization code or refresh token is invalid or expired.
    InvalidGrant,
    /// A requested scope is invalid or unknown.
    InvalidScope,
    /// The client may not use this grant type.
    UnauthorizedClient,
    /// The caller cancelled the attempt.
    Cancelled,
    /// No callback arrived in time.
    Timeout,
    /// The callback `state` did not match the one issued.
    StateMismatch,
    /// The callback carried neither `code` nor `error`.
    NoCode,
    /// The code could not be exchanged for tokens.
    TokenExchangeFailed,
    /// Anything else.
    Unknown,
}

impl AuthErrorCode {
    /// Map a provider `error` parameter onto the taxonomy.
    ///
    /// Only provider-defined codes are recognized. Codes latchkey raises
    /// itself (`timeout`, `state_mismatch` and so on) arriving over the wire
    /// are `Unknown`.
    pub fn from_oauth(code: &str) -> Self {
        match code {
            "access_denied" => Self::AccessDenied,
            "org_internal" => Self::OrgInternal,
            "invalid_client" => Self::InvalidClient,
            "invalid_grant" => Self::InvalidGrant,
            "invalid_scope" => Self::InvalidScope,
            "unauthorized_client" => Self::UnauthorizedClient,
            _ => Self::Unknown,
        }
    }

    /// Wire spelling of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "access_denied",
            Self::OrgInternal => "org_internal",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidScope => "invalid_scope",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::StateMismatch => "state_mismatch",
            Self::NoCode => "no_code",
            Self::TokenExchangeFailed => "token_exchange_failed",
            Self::Unknown => "unknown",
        }
    }

    /// Fixed user-facing message for this code.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::AccessDenied => {
                "Access was denied. Grant the requested permissions to connect your account."
            }
            Self::OrgInternal => {
                "This application is restricted to accounts inside its organization. Sign in with an account from that organization."
            }
            Self::InvalidClient => {
                "The application's OAuth client is misconfigured. Check the client ID and secret."
            }
            Self::InvalidGrant => "Your authorization has expired or was revoked. Please sign in again.",
            Self::InvalidScope => "The requested permissions are not available for this account.",
            Self::UnauthorizedClient => {
                "This application is not allowed to use this sign-in method."
            }
            Self::Cancelled => "Sign-in was cancelled.",
            Self::Timeout => "Sign-in timed out waiting for the browser. Please try again.",
            Self::StateMismatch => {
                "The sign-in response could not be verified. Please start the sign-in again."
            }
            Self::NoCode => "The provider did not return an authorization code. Please try again.",
            Self::TokenExchangeFailed => {
                "Signing in with the provider could not be completed. Please try again."
            }
            Self::Unknown => "An unexpected error occurred during sign-in.",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Turn a raw provider error code into a user-facing message.
///
/// Codes outside the taxonomy still get a readable message that names the raw
/// code so support can diagnose it.
pub fn classify(error_code: &str) -> String {
    match AuthErrorCode::from_oauth(error_code) {
        AuthErrorCode::Unknown => format!(
            "Sign-in failed with an unexpected error ({}). Please try again.",
            error_code
        ),
        known => known.user_message().to_string(),
    }
}

/// A failed authorization attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    pub code: AuthErrorCode,
    /// Diagnostic detail (provider description, transport error text).
    pub message: String,
    pub user_message: String,
}

impl AuthFailure {
    /// Failure with the code's standard user message.
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            user_message: code.user_message().to_string(),
        }
    }

    /// Failure for a provider-reported `error` parameter.
    pub fn from_provider(error: &str, description: Option<&str>) -> Self {
        Self {
            code: AuthErrorCode::from_oauth(error),
            message: description.unwrap_or(error).to_string(),
            user_message: classify(error),
        }
    }

    /// Replace the derived user message.
    pub fn with_user_message(mut self, user_message: impl Into<String>) -> Self {
        self.user_message = user_message.into();
        self
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Terminal result of [`Authenticator::authenticate`](crate::authorize::Authenticator::authenticate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Succeeded,
    Failed(AuthFailure),
}

impl AuthOutcome {
    pub fn failed(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self::Failed(AuthFailure::new(code, message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// The failure code, if any.
    pub fn error_code(&self) -> Option<AuthErrorCode> {
        match self {
            Self::Succeeded => None,
            Self::Failed(failure) => Some(failure.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROVIDER: [AuthErrorCode; 6] = [
        AuthErrorCode::AccessDenied,
        AuthErrorCode::OrgInternal,
        AuthErrorCode::InvalidClient,
        AuthErrorCode::InvalidGrant,
        AuthErrorCode::InvalidScope,
        AuthErrorCode::UnauthorizedClient,
    ];

    const LOCAL: [AuthErrorCode; 6] = [
        AuthErrorCode::Cancelled,
        AuthErrorCode::Timeout,
        AuthErrorCode::StateMismatch,
        AuthErrorCode::NoCode,
        AuthErrorCode::TokenExchangeFailed,
        AuthErrorCode::Unknown,
    ];

    #[test]
    fn test_provider_codes_parse_from_wire_spelling() {
        for code in PROVIDER {
            assert_eq!(AuthErrorCode::from_oauth(code.as_str()), code);
        }
    }

    #[test]
    fn test_local_codes_from_provider_are_unknown() {
        for code in LOCAL {
            assert_eq!(
                AuthErrorCode::from_oauth(code.as_str()),
                AuthErrorCode::Unknown,
                "{code}"
            );
            assert!(classify(code.as_str()).contains(code.as_str()));
        }
    }

    #[test]
    fn test_known_codes_classify_to_fixed_message() {
        assert_eq!(
            classify("access_denied"),
            AuthErrorCode::AccessDenied.user_message()
        );
        assert_eq!(
            classify("invalid_grant"),
            AuthErrorCode::InvalidGrant.user_message()
        );
    }

    #[test]
    fn test_unknown_code_message_names_raw_code() {
        let msg = classify("temporarily_unavailable");
        assert!(msg.contains("temporarily_unavailable"));
        assert_eq!(
            AuthErrorCode::from_oauth("temporarily_unavailable"),
            AuthErrorCode::Unknown
        );
    }

    #[test]
    fn test_provider_failure_keeps_description() {
        let failure = AuthFailure::from_provider("access_denied", Some("User said no"));
        assert_eq!(failure.code, AuthErrorCode::AccessDenied);
        assert_eq!(failure.message, "User said no");
        assert_eq!(failure.user_message, AuthErrorCode::AccessDenied.user_message());
    }

    #[test]
    fn test_user_message_override() {
        let failure =
            AuthFailure::new(AuthErrorCode::Unknown, "boom").with_user_message("Try turning it off");
        assert_eq!(failure.user_message, "Try turning it off");
        assert_eq!(failure.to_string(), "unknown: boom");
    }

    #[test]
    fn test_outcome_helpers() {
        assert!(AuthOutcome::Succeeded.is_success());
        assert_eq!(AuthOutcome::Succeeded.error_code(), None);
        let failed = AuthOutcome::failed(AuthErrorCode::Timeout, "no callback");
        assert!(!failed.is_success());
        assert_eq!(failed.error_code(), Some(AuthErrorCode::Timeout));
    }
}
