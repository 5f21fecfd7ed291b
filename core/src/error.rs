//! Error types for the fetch client.
//!
//! # Design
//! Every call resolves to exactly one `FetchError` when it does not succeed.
//! `Timeout` and `Cancelled` are separate variants because callers react to
//! them differently: a timeout is shown to the user, a cancellation means the
//! call was superseded and is dropped silently. `InvalidRequest` covers
//! problems found before any I/O happens.

use std::time::Duration;

use crate::cancel::CancelReason;
use crate::http::HttpMethod;

/// Classified failure of a single request.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The server answered with a non-2xx status.
    #[error("API error ({method} {path}): {status}")]
    HttpStatus {
        method: HttpMethod,
        path: String,
        status: u16,
    },

    /// The timeout-derived signal fired before the transport completed.
    #[error("{message}")]
    Timeout { message: String },

    /// The caller's own signal fired before the transport completed.
    #[error("request cancelled")]
    Cancelled,

    /// DNS failure, connection reset, malformed response body and the like.
    #[error("network error: {cause}")]
    Network { cause: String },

    /// The request could not be built.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
}

impl FetchError {
    pub(crate) fn timed_out(after: Option<Duration>) -> Self {
        let message = match after {
            Some(after) => format!(
                "The server is taking too long to respond (no answer after {} ms)",
                after.as_millis()
            ),
            None => "The server is taking too long to respond".to_string(),
        };
        FetchError::Timeout { message }
    }

    pub(crate) fn from_cancel(reason: CancelReason, timeout: Option<Duration>) -> Self {
        match reason {
            CancelReason::Cancelled => FetchError::Cancelled,
            CancelReason::TimedOut => FetchError::timed_out(timeout),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout { .. })
    }

    /// Status code for `HttpStatus` failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Text to show the user, or `None` when the failure should stay silent.
    pub fn user_message(&self) -> Option<String> {
        match self {
            FetchError::Cancelled => None,
            other => Some(other.to_string()),
        }
    }
}

/// Failure reported by a `Transport` implementation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The transport gave up because the request's signal fired.
    #[error("request aborted")]
    Aborted,

    #[error("{0}")]
    Failed(String),
}
