//! HTTP transport for JSON-RPC calls
//!
//! The transport is a trait so tests can script transport failures and
//! canned responses without a live node.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RpcClientError;

/// One HTTP POST of a JSON body to an endpoint.
///
/// Implementations return the parsed response body; classifying the
/// JSON-RPC payload is the client's job.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, RpcClientError>;
}

/// Production transport over reqwest with a fixed per-request timeout.
/// A timed-out call surfaces as a Transport error and counts against
/// the retry budget.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self, RpcClientError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RpcClientError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, RpcClientError> {
        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| RpcClientError::Transport(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(RpcClientError::Transport(format!(
                "HTTP error: status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RpcClientError::InvalidResponse(format!("Body is not JSON: {}", e)))
    }
}
