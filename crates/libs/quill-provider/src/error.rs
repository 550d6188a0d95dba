use serde::{Deserialize, Serialize};

/// Stable machine codes carried alongside every rejection.
///
/// Analytics and the page-side relay key off these, so they never change
/// once shipped.
pub mod code {
    pub const VALIDATION: &str = "WALLET_VALIDATION_FAILED";
    pub const UNSUPPORTED_METHOD: &str = "WALLET_UNSUPPORTED_METHOD";
    pub const NOT_CONNECTED: &str = "WALLET_NOT_CONNECTED";
    pub const RATE_LIMITED: &str = "WALLET_RATE_LIMITED";
    pub const USER_DENIED: &str = "WALLET_USER_DENIED";
    pub const TIMEOUT: &str = "WALLET_TIMEOUT";
    pub const REPLAY_REJECTED: &str = "WALLET_REPLAY_REJECTED";
    pub const SETUP_REQUIRED: &str = "WALLET_SETUP_REQUIRED";
    pub const LOCKED: &str = "WALLET_LOCKED";
    pub const UI_UNAVAILABLE: &str = "WALLET_UI_UNAVAILABLE";
    pub const INTERNAL: &str = "WALLET_INTERNAL_ERROR";
}

/// Errors surfaced to the requesting page.
///
/// Every code path that parks a pending request settles with exactly one of
/// these; `Timeout` and `UserDenied` are deliberately distinct variants so
/// the page can tell an expired approval from an explicit rejection.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ProviderError {
    #[error("invalid request: {message}")]
    Validation { message: String },

    #[error("unsupported method: {method}")]
    Unsupported { method: String },

    #[error("origin is not connected: {origin}")]
    Permission { origin: String },

    #[error("rate limited; retry in {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("user denied {operation}")]
    UserDenied { operation: String },

    #[error("timed out waiting for {operation}")]
    Timeout { operation: String },

    #[error("replay rejected: {reason}")]
    Replay { reason: String },

    #[error("wallet setup required")]
    SetupRequired,

    #[error("wallet is locked")]
    Locked,

    #[error("no approval surface could be opened")]
    UiUnavailable,

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ProviderError {
    /// Returns `true` for transient errors that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::UiUnavailable
        )
    }

    /// Stable machine code for this rejection kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => code::VALIDATION,
            Self::Unsupported { .. } => code::UNSUPPORTED_METHOD,
            Self::Permission { .. } => code::NOT_CONNECTED,
            Self::RateLimited { .. } => code::RATE_LIMITED,
            Self::UserDenied { .. } => code::USER_DENIED,
            Self::Timeout { .. } => code::TIMEOUT,
            Self::Replay { .. } => code::REPLAY_REJECTED,
            Self::SetupRequired => code::SETUP_REQUIRED,
            Self::Locked => code::LOCKED,
            Self::UiUnavailable => code::UI_UNAVAILABLE,
            Self::Internal { .. } => code::INTERNAL,
        }
    }

    /// Convenience constructor for `Validation`.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Convenience constructor for `Unsupported`.
    pub fn unsupported(method: impl Into<String>) -> Self {
        Self::Unsupported { method: method.into() }
    }

    /// Convenience constructor for `UserDenied`.
    pub fn user_denied(operation: impl Into<String>) -> Self {
        Self::UserDenied { operation: operation.into() }
    }

    /// Convenience constructor for `Timeout`.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout { operation: operation.into() }
    }

    /// Convenience constructor for `Internal`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_covers_transient_kinds_only() {
        assert!(ProviderError::RateLimited { retry_after_ms: 250 }.is_retryable());
        assert!(ProviderError::timeout("approval").is_retryable());
        assert!(ProviderError::UiUnavailable.is_retryable());
        assert!(!ProviderError::user_denied("connect").is_retryable());
        assert!(!ProviderError::Replay { reason: "broadcasted".into() }.is_retryable());
    }

    #[test]
    fn denial_and_timeout_codes_are_distinct() {
        let denied = ProviderError::user_denied("compose_send");
        let expired = ProviderError::timeout("compose_send");
        assert_ne!(denied.code(), expired.code());
    }

    #[test]
    fn error_round_trips_through_json() {
        let err = ProviderError::RateLimited { retry_after_ms: 1_200 };
        let json = serde_json::to_string(&err).expect("serialize");
        let back: ProviderError = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(err, back);
    }
}
