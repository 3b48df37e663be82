//! Authentication error types.

use forkful_config_and_utils::{CoreError, HttpFailure};
use remote_config_client::RemoteConfigError;
use thiserror::Error;

/// Authentication error type.
///
/// An MFA challenge is not an error; it is returned as a distinct outcome.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Required input missing, caught before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Non-2xx response with no recognized structured shape
    #[error("{0}")]
    Transport(HttpFailure),

    /// Token endpoint rejected the client secret (`invalid_client`)
    #[error("Client secret rejected: {0}")]
    InvalidClient(HttpFailure),

    /// HTTP request error (connect, TLS, timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Response decoded but is missing required fields
    #[error("Decode error: {0}")]
    Decode(String),

    /// No stored session to refresh
    #[error("Not logged in")]
    NotLoggedIn,

    /// OTP supplied but there is no persisted challenge to resume
    #[error("No pending MFA challenge; log in with a password first")]
    NoPendingChallenge,

    /// No source produced a client secret
    #[error("Client secret unavailable: {0}")]
    SecretUnavailable(String),

    /// Remote-config handshake failed
    #[error("Remote config error: {0}")]
    RemoteConfig(RemoteConfigError),

    /// Invalid state transition in the auth FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<RemoteConfigError> for AuthError {
    fn from(err: RemoteConfigError) -> Self {
        match err {
            RemoteConfigError::Cancelled => AuthError::Cancelled,
            other => AuthError::RemoteConfig(other),
        }
    }
}

impl AuthError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::NoPendingChallenge | Self::InvalidUrl(_) => "validation",
            Self::Transport(_) | Self::Http(_) => "transport",
            Self::InvalidClient(_) => "invalid_client",
            Self::Json(_) | Self::Decode(_) => "decode",
            Self::NotLoggedIn => "not_logged_in",
            Self::SecretUnavailable(_) => "secret_unavailable",
            Self::RemoteConfig(e) => e.code(),
            Self::InvalidStateTransition(_) => "invalid_state",
            Self::Config(_) => "config",
            Self::Cancelled => "cancelled",
        }
    }

    /// Demote an `invalid_client` rejection to a plain transport error.
    ///
    /// Used after the one permitted refetch-and-retry has also been rejected.
    pub fn into_transport(self) -> Self {
        match self {
            AuthError::InvalidClient(failure) => AuthError::Transport(failure),
            other => other,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;
