//! Error handling and custom error types
//!
//! Provides unified error handling across the application using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown seme id: {0}")]
    UnknownSeme(String),

    #[error("Model request timed out")]
    ModelTimeout,

    #[error("Model API error (status {status}): {message}")]
    ModelApi { status: u16, message: String },

    #[error("Malformed model response: {0}")]
    MalformedModelResponse(String),

    #[error("Analytics error: {0}")]
    Analytics(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl Error {
    /// Whether the model gateway may retry the request that produced this error.
    ///
    /// Only throttling (429), upstream 5xx responses, and request timeouts
    /// qualify; every other failure is terminal for the call.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ModelTimeout => true,
            Error::ModelApi { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::ModelTimeout.is_retryable());
        assert!(Error::ModelApi {
            status: 429,
            message: "quota".to_string()
        }
        .is_retryable());
        assert!(Error::ModelApi {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_retryable());

        assert!(!Error::ModelApi {
            status: 403,
            message: "forbidden".to_string()
        }
        .is_retryable());
        assert!(!Error::UnknownSeme("sem_42".to_string()).is_retryable());
        assert!(!Error::MalformedModelResponse("no candidates".to_string()).is_retryable());
    }
}
