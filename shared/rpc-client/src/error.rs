//! RPC client errors

use thiserror::Error;

/// Errors raised by the RPC client
#[derive(Error, Debug)]
pub enum RpcClientError {
    /// Endpoint unreachable, timed out, or returned a bad HTTP status
    #[error("Transport error: {0}")]
    Transport(String),

    /// The node returned a structured JSON-RPC error. Treated like a
    /// transport failure for retry purposes (assume transient).
    #[error("RPC error {code}: {message}")]
    Protocol { code: i64, message: String },

    /// The response body did not parse as the expected JSON-RPC shape
    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    /// Client misconfiguration (no endpoints, bad URL)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every endpoint/attempt combination failed. Carries the last
    /// underlying error for diagnostics.
    #[error("All {endpoints} endpoints exhausted after {attempts} attempts")]
    AllEndpointsExhausted {
        endpoints: usize,
        attempts: u32,
        #[source]
        last_error: Box<RpcClientError>,
    },

    /// The payload decoded but a field had a malformed shape. Never
    /// retried: the data will not change.
    #[error(transparent)]
    Validation(#[from] chain_common::ValidationError),
}

impl RpcClientError {
    /// Whether the error class is worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RpcClientError::Transport(_)
                | RpcClientError::Protocol { .. }
                | RpcClientError::InvalidResponse(_)
        )
    }
}
