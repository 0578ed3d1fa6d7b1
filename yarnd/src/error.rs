//! The daemon's failure modes, each mapped onto a wire status code.
//!
//! Scope handlers return `Result<Response>`; whatever bubbles up is rendered
//! into a `{status, message}` response at the controller boundary, so no
//! error ever escapes the dispatcher.

use protocol::{
    STATUS_CONFLICT, STATUS_INTERNAL_ERROR, STATUS_INVALID, STATUS_NOT_FOUND, STATUS_UNSUPPORTED,
};
use tale_engine::EngineError;
use thiserror::Error;

/// Generic message for failures we don't want to leak details about.
pub const INTERNAL_ERROR_MSG: &str = "An internal error occurred";

#[derive(Debug, Error)]
pub enum Error {
    /// A missing or wrongly typed argument (400).
    #[error("{0}")]
    Invalid(String),

    /// An unknown game, entity, dump or slot (404).
    #[error("{0}")]
    NotFound(String),

    /// A name collision (409).
    #[error("{0}")]
    Conflict(String),

    /// A disabled feature or a driver that can't do this (501).
    #[error("{0}")]
    Unsupported(String),

    /// Everything else (500).
    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn status(&self) -> u16 {
        match self {
            Error::Invalid(_) => STATUS_INVALID,
            Error::NotFound(_) => STATUS_NOT_FOUND,
            Error::Conflict(_) => STATUS_CONFLICT,
            Error::Unsupported(_) => STATUS_UNSUPPORTED,
            Error::Internal(_) => STATUS_INTERNAL_ERROR,
        }
    }
}

impl From<EngineError> for Error {
    fn from(error: EngineError) -> Error {
        match error {
            EngineError::EntityExists(_) => Error::Conflict(error.to_string()),
            EngineError::PlayerNotFound(_) | EngineError::EntityNotFound(_) => {
                Error::NotFound(error.to_string())
            }
            other => Error::Internal(other.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Error {
        Error::Internal(error.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Error {
        Error::Internal(error.to_string())
    }
}
