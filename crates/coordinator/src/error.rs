//! Error taxonomy for the coordination layer.
//!
//! Transport failures and claim conflicts are deliberately *not* here:
//! the first is absorbed by the push adapter (surfaced as a
//! `ConnectionState` change), the second is a defined `ClaimOutcome`.

use thiserror::Error;

/// Errors from the request/response backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors from the push transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("connection closed")]
    Closed,

    #[error("transport protocol error: {0}")]
    Protocol(String),
}

/// Errors surfaced to callers of the coordinator façade.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The session is `Closed` or `TimedOut`; rejected locally without a
    /// round trip.
    #[error("session {0} has ended")]
    SessionEnded(String),

    #[error("unknown session {0}")]
    SessionUnknown(String),

    #[error("message {0} is not awaiting retry")]
    NotRetryable(String),

    #[error("API call failed: {0}")]
    Api(#[from] ApiError),

    #[error("coordinator is shut down")]
    ChannelClosed,
}
