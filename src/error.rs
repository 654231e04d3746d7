use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// NetworkError
// ---------------------------------------------------------------------------

/// HTTP non-2xx response or a transport-level failure talking to the backend.
///
/// Retryable by re-issuing the action that produced it.
#[derive(Debug, Clone)]
pub struct NetworkError {
    pub status: Option<u16>,
    pub message: String,
}

impl NetworkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "Network error (HTTP {status}): {}", self.message),
            None => write!(f, "Network error: {}", self.message),
        }
    }
}

impl std::error::Error for NetworkError {}

// ---------------------------------------------------------------------------
// ParseError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed XML: {0}")]
    Xml(String),

    #[error("Unexpected {context} payload: {detail}")]
    UnexpectedShape { context: String, detail: String },

    #[error("Invalid geometry: {0}")]
    Geometry(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ParseError {
    pub fn shape(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UnexpectedShape {
            context: context.into(),
            detail: detail.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerTransactionError
// ---------------------------------------------------------------------------

/// The WFS server rejected a transaction. `message` is the server's own text.
#[derive(Debug, Clone, Error)]
#[error("Transaction rejected by server: {message}")]
pub struct ServerTransactionError {
    pub message: String,
}

// ---------------------------------------------------------------------------
// EditError: top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EditError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Transaction(#[from] ServerTransactionError),

    /// Cancelled by a newer user action. Never surfaced to the user.
    #[error("Operation aborted")]
    Aborted,

    #[error("Invalid layer id \"{0}\"")]
    InvalidLayerId(String),

    #[error("No editable service is selected")]
    NoActiveService,

    #[error("Unknown feature \"{0}\"")]
    UnknownFeature(String),

    #[error("Invalid value for \"{key}\": {detail}")]
    InvalidValue { key: String, detail: String },
}

impl EditError {
    /// True for cancellations, which callers swallow instead of reporting.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// True when re-issuing the same action may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<serde_json::Error> for EditError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(ParseError::Json(e))
    }
}

/// Convenience alias: the default error type is `EditError`.
pub type Result<T, E = EditError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
