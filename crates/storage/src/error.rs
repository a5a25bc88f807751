//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Container or blob does not exist
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Access denied (permissions or credentials)
    #[display("permission denied: {_0}")]
    PermissionDenied(#[error(not(source))] String),
    /// Container or blob name the service would reject
    #[display("invalid name: {_0:?}")]
    InvalidName(#[error(not(source))] String),
    /// Content digest could not be decoded
    #[display("invalid content digest: {_0:?}")]
    InvalidDigest(#[error(not(source))] String),
    /// Account credentials are malformed
    #[display("invalid credentials: {_0}")]
    InvalidCredentials(#[error(not(source))] String),
    /// Service endpoint URL is unusable
    #[display("invalid endpoint: {_0}")]
    InvalidEndpoint(#[error(not(source))] String),
    /// Network-related error (connection, TLS, timeouts)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The service answered with a non-success status
    #[display("service returned {status}: {code}")]
    Service { status: u16, code: String },
    /// The service answered with something we could not understand
    #[display("invalid response: {_0}")]
    InvalidResponse(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
    /// A committed block list referenced blocks that were never staged
    #[display("invalid block list: {_0}")]
    InvalidBlockList(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(_) | Self::Network(_) => true,
            Self::Service { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }
}
