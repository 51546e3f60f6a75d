//! Error types for psyportal.

use thiserror::Error;

/// Every failure the client can surface.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed payload: {0}")]
    Payload(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Push provider error: {0}")]
    Push(String),

    #[error("Push registration error: {0}")]
    Registration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PortalError {
    /// Transient errors are expected to heal on the next poll interval.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PortalError>;
