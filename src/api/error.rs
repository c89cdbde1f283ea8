use thiserror::Error;

/// Failures on the request/response boundaries (settings store, subject
/// list, upload). Each carries the action shown to the operator.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{action} failed: server responded with status {status}")]
    Status { action: &'static str, status: u16 },

    #[error("{action} failed: {message}")]
    Transport {
        action: &'static str,
        message: String,
    },

    #[error("{action} failed: unexpected response ({message})")]
    Decode {
        action: &'static str,
        message: String,
    },

    /// Rejected before any request was made.
    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    /// The operator action that failed, if a request was attempted.
    pub fn action(&self) -> Option<&'static str> {
        match self {
            ApiError::Status { action, .. }
            | ApiError::Transport { action, .. }
            | ApiError::Decode { action, .. } => Some(action),
            ApiError::Validation(_) => None,
        }
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, ApiError>;
