//! Backend error types

use std::fmt;

/// Errors raised while talking to a model backend or a tool service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Request did not complete within the configured timeout
    Timeout(String),
    /// Connection could not be established or was dropped
    Network(String),
    /// Backend answered with a non-success HTTP status
    Status { status: u16, message: String },
    /// Backend answered with something we could not decode
    InvalidResponse(String),
    /// Backend stopped the work before it finished
    Interrupted(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Timeout(msg) => write!(f, "Request timed out: {}", msg),
            BackendError::Network(msg) => write!(f, "Network error: {}", msg),
            BackendError::Status { status, message } => {
                write!(f, "Backend returned HTTP {}: {}", status, message)
            }
            BackendError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            BackendError::Interrupted(msg) => write!(f, "Interrupted: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout(e.to_string())
        } else if e.is_decode() {
            BackendError::InvalidResponse(e.to_string())
        } else if let Some(status) = e.status() {
            BackendError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            BackendError::Network(e.to_string())
        }
    }
}
