//! Error types for the ingestion client.
//!
//! Every failure the client can hit falls into one of a handful of classes,
//! and each class has exactly one handling rule:
//!
//! - **Auth**: fatal, surfaced immediately, never retried or resent.
//! - **Transport**: retried at the owning component's own cadence.
//! - **Protocol**: a send that produced no usable handle is a lost send; a
//!   poll that produced no usable map is an empty result.
//! - **ChannelInvalid**: the channel is replaced and its handles expire.
//! - **Capacity**: backpressure, never a silent drop.

use crate::channel::ChannelId;
use thiserror::Error;

/// Ingestion client error type.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Credentials were rejected by the endpoint.
    #[error("Authentication failed: {status} - {message}")]
    Auth {
        /// HTTP status code returned by the endpoint.
        status: u16,
        /// Response body or service message.
        message: String,
    },

    /// HTTP request error (connection, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Retryable transport-level failure reported by the endpoint
    #[error("Transport error: {0}")]
    Transport(String),

    /// Successful response without the expected fields
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The endpoint no longer recognizes the channel.
    #[error("Channel {channel} rejected: {message}")]
    ChannelInvalid {
        /// The rejected channel.
        channel: ChannelId,
        /// Service message explaining the rejection.
        message: String,
    },

    /// Local or remote ceiling on outstanding handles reached.
    #[error("Capacity exhausted: {outstanding} outstanding handles (limit {limit})")]
    Capacity {
        /// Handles currently outstanding.
        outstanding: usize,
        /// The ceiling that was hit.
        limit: usize,
    },

    /// The endpoint refused the request itself (malformed event, bad index).
    #[error("Request rejected: {status} - {message}")]
    Rejected {
        /// HTTP status code returned by the endpoint.
        status: u16,
        /// Response body or service message.
        message: String,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The client has been shut down.
    #[error("Client is shut down")]
    Shutdown,
}

impl IngestError {
    /// Whether the failure may succeed if the same request is repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Transport(_))
    }

    /// Whether the failure must stop all further delivery attempts.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

/// Result type for ingestion client operations.
pub type IngestResult<T> = Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_display() {
        let err = IngestError::Auth {
            status: 401,
            message: "Invalid token".to_string(),
        };
        assert_eq!(format!("{}", err), "Authentication failed: 401 - Invalid token");
    }

    #[test]
    fn classification() {
        assert!(IngestError::Transport("busy".into()).is_retryable());
        assert!(!IngestError::Protocol("no ackId".into()).is_retryable());
        assert!(IngestError::Auth {
            status: 403,
            message: String::new()
        }
        .is_fatal());
        assert!(!IngestError::Capacity {
            outstanding: 10,
            limit: 10
        }
        .is_fatal());
    }

    #[test]
    fn json_error_from_serde() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{{{").unwrap_err();
        let err: IngestError = serde_err.into();
        assert!(format!("{}", err).starts_with("JSON error:"));
    }
}
