//! Unified error handling for the consort crate
//!
//! Every fallible operation in the coordination layer reports through a single
//! [`Error`] enum. The variants mirror how a caller is expected to react:
//!
//! - [`Error::BackendUnavailable`] - the backend could not be reached at all
//! - [`Error::Backend`] - the backend answered, but with a non-2xx status or a
//!   payload we could not make sense of
//! - [`Error::NotFound`] - an expected record or field is absent
//! - [`Error::Cancelled`] - a blocking loop was interrupted by shutdown
//!
//! # Usage
//!
//! ```rust,ignore
//! use consort::error::{Error, ErrorCategory};
//!
//! fn handle(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!("retrying: {err}");
//!     } else {
//!         tracing::error!(category = ?err.category(), "giving up: {err}");
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transport-level failures talking to the backend
    Network,
    /// The backend answered with something unusable
    Backend,
    /// A record or field was absent
    Missing,
    /// Configuration and validation errors
    Config,
    /// Shutdown interrupted the operation
    Cancelled,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Backend => "backend",
            Self::Missing => "missing",
            Self::Config => "config",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the consort crate
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The request never completed (connect failure, timeout, reset)
    #[error("coordination backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Non-2xx status or malformed payload
    #[error("coordination backend error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Backend {
        status: Option<u16>,
        message: String,
    },

    /// Absent record or field; a normal outcome rather than a fault
    #[error("not found: {0}")]
    NotFound(String),

    /// Interrupted by a shutdown signal
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration errors
    #[error("config error: {0}")]
    Config(String),

    /// Operation not allowed in the current lifecycle state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a backend error for an unexpected status
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Backend {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a backend error for a payload that could not be interpreted
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Backend {
            status: None,
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Check if this error is worth retrying
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::BackendUnavailable(_) => true,
            Self::Backend { status, .. } => matches!(status, Some(s) if *s >= 500 || *s == 429),
            Self::NotFound(_) => true,
            Self::Io(_) => true,
            Self::Cancelled | Self::Config(_) | Self::InvalidState(_) | Self::Json(_) => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::BackendUnavailable(_) => ErrorCategory::Network,
            Self::Backend { .. } | Self::Json(_) => ErrorCategory::Backend,
            Self::NotFound(_) => ErrorCategory::Missing,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Config(_) => ErrorCategory::Config,
            Self::InvalidState(_) | Self::Io(_) => ErrorCategory::Other,
        }
    }

    /// Whether this is the "absent" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::malformed(err.to_string())
        } else if let Some(status) = err.status() {
            Self::status(status.as_u16(), err.to_string())
        } else {
            Self::BackendUnavailable(err.to_string())
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
