use crate::ipc::protocol::error_codes;
use crate::llm::BackendError;
use crate::models::SessionKeyError;
use thiserror::Error;

use super::retry::Disposition;

/// Failure of one attempt at a command's unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Backend rejected the request or answered with garbage
    #[error("backend error: {0}")]
    Backend(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("interrupted: {0}")]
    Interrupted(String),

    #[error("{0}")]
    Other(String),
}

impl CommandError {
    /// Only timeouts and interruptions are worth another attempt.
    pub fn disposition(&self) -> Disposition {
        match self {
            CommandError::Timeout(_) | CommandError::Interrupted(_) => Disposition::Retry,
            CommandError::Backend(_) | CommandError::Io(_) | CommandError::Other(_) => {
                Disposition::Terminal
            }
        }
    }

    /// Reply error code for this failure class
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::Backend(_) => error_codes::BACKEND_ERROR,
            CommandError::Timeout(_) => error_codes::TIMEOUT,
            CommandError::Io(_) => error_codes::IO_ERROR,
            CommandError::Interrupted(_) => error_codes::INTERRUPTED,
            CommandError::Other(_) => error_codes::INTERNAL_ERROR,
        }
    }
}

impl From<BackendError> for CommandError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Timeout(msg) => CommandError::Timeout(msg),
            BackendError::Network(msg) => CommandError::Io(msg),
            BackendError::Interrupted(msg) => CommandError::Interrupted(msg),
            e @ (BackendError::Status { .. } | BackendError::InvalidResponse(_)) => {
                CommandError::Backend(e.to_string())
            }
        }
    }
}

impl From<SessionKeyError> for CommandError {
    fn from(e: SessionKeyError) -> Self {
        CommandError::Other(e.to_string())
    }
}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => CommandError::Timeout(e.to_string()),
            std::io::ErrorKind::Interrupted => CommandError::Interrupted(e.to_string()),
            _ => CommandError::Io(e.to_string()),
        }
    }
}
