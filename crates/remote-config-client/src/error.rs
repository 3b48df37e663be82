use forkful_config_and_utils::HttpFailure;
use thiserror::Error;

/// Errors from the installation + fetch handshake.
#[derive(Debug, Error)]
pub enum RemoteConfigError {
    /// Build-time Firebase identity is missing fields.
    #[error("Firebase app identity incomplete, missing: {0}")]
    IncompleteIdentity(String),

    /// Network or client failure before a status was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response from either endpoint.
    #[error("{0}")]
    Status(HttpFailure),

    /// Response body did not decode.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The template has no entry under the expected key.
    #[error("Remote config entry missing: {0}")]
    MissingEntry(String),

    #[error("Remote config fetch cancelled")]
    Cancelled,
}

impl RemoteConfigError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::IncompleteIdentity(_) => "validation",
            Self::Http(_) | Self::Status(_) => "transport",
            Self::Json(_) | Self::MissingEntry(_) => "decode",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Result type alias using RemoteConfigError.
pub type RemoteConfigResult<T> = Result<T, RemoteConfigError>;
