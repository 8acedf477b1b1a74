//! Error types for Gridshare core.

use thiserror::Error;

/// Errors that can occur in the Gridshare client core
#[derive(Error, Debug)]
pub enum GridshareError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Rejected input, either locally or by the server (4xx with a message).
    #[error("{0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("Channel is not connected")]
    NotConnected,
}

impl From<serde_json::Error> for GridshareError {
    fn from(err: serde_json::Error) -> Self {
        GridshareError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GridshareError>;
