use auth_engine::AuthError;
use thiserror::Error;

/// Failures of an external script collaborator.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Collaborator program not found: {program}")]
    NotFound { program: String },

    #[error("Collaborator timed out after {timeout_secs}s: {script}")]
    Timeout { script: String, timeout_secs: u64 },

    #[error("Collaborator cancelled")]
    Cancelled,

    #[error("Collaborator failed with exit code {exit_code:?}: {stderr}")]
    Failed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The script wrote `{"error": "..."}` to its output file.
    #[error("Collaborator reported an error: {0}")]
    Reported(String),

    #[error("Collaborator I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Collaborator output is not usable: {0}")]
    Decode(String),
}

impl CollaboratorError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "collaborator_not_found",
            Self::Timeout { .. } => "collaborator_timeout",
            Self::Cancelled => "cancelled",
            Self::Failed { .. } => "collaborator_failed",
            Self::Reported(_) => "collaborator_reported",
            Self::Io(_) => "collaborator_io",
            Self::Decode(_) => "decode",
        }
    }
}

/// Session import error type.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Collaborator(e) => e.code(),
            Self::Auth(e) => e.code(),
            Self::Decode(_) | Self::Json(_) => "decode",
        }
    }
}

pub type ImportResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_delegate() {
        let err: ImportError = CollaboratorError::Reported("no cookies".into()).into();
        assert_eq!(err.code(), "collaborator_reported");
        assert_eq!(err.to_string(), "Collaborator reported an error: no cookies");

        let err: ImportError = AuthError::Validation("host missing".into()).into();
        assert_eq!(err.code(), "validation");
    }
}
