//! RPC client with sticky endpoint rotation and retry/failover
//!
//! Endpoints are tried in rotation starting from the last one that
//! succeeded. Per endpoint, a call is retried up to a fixed attempt
//! count with exponential backoff (`base_delay * 2^attempt`) before
//! moving to the next endpoint. Only exhausting every endpoint/attempt
//! combination propagates to the caller.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::RpcClientError;
use crate::transport::{HttpTransport, RpcTransport};
use crate::types::{RpcRequest, RpcResponse};

/// RPC client configuration
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Ordered list of candidate endpoint URLs for one chain
    pub endpoints: Vec<String>,

    /// Retry attempts per endpoint before failing over
    pub max_attempts: u32,

    /// Base delay for exponential backoff between attempts
    pub base_delay: Duration,

    /// Fixed per-request HTTP timeout
    pub request_timeout: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://localhost:8545".to_string()],
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// JSON-RPC client bound to one chain's endpoint list
pub struct RpcClient {
    transport: Arc<dyn RpcTransport>,
    endpoints: Vec<String>,

    /// Index of the last endpoint that succeeded; rotation starts here
    preferred: AtomicUsize,

    /// Monotonic request id
    next_id: AtomicU64,

    max_attempts: u32,
    base_delay: Duration,
}

impl RpcClient {
    /// Create a client with the production HTTP transport
    pub fn new(config: RpcClientConfig) -> Result<Self, RpcClientError> {
        let transport = Arc::new(HttpTransport::new(config.request_timeout)?);
        Self::with_transport(config, transport)
    }

    /// Create a client over a caller-supplied transport (tests)
    pub fn with_transport(
        config: RpcClientConfig,
        transport: Arc<dyn RpcTransport>,
    ) -> Result<Self, RpcClientError> {
        if config.endpoints.is_empty() {
            return Err(RpcClientError::Config(
                "At least one endpoint must be configured".to_string(),
            ));
        }
        for endpoint in &config.endpoints {
            Url::parse(endpoint)
                .map_err(|e| RpcClientError::Config(format!("Bad endpoint '{}': {}", endpoint, e)))?;
        }

        Ok(Self {
            transport,
            endpoints: config.endpoints,
            preferred: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay,
        })
    }

    /// Issue a single JSON-RPC call, returning the `result` member.
    ///
    /// A response carrying an `error` member is a Protocol failure and
    /// is retried exactly like a transport failure.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(method, params, id);
        let body = serde_json::to_value(&request)
            .map_err(|e| RpcClientError::Config(format!("Unserializable request: {}", e)))?;

        let raw = self
            .send_with_failover(method, &body, classify_single)
            .await?;

        // classify_single already rejected error/missing-result shapes
        Ok(raw)
    }

    /// Issue a batch of JSON-RPC calls in one HTTP request.
    ///
    /// Responses are matched to requests by id (servers may reorder) and
    /// returned in request order. Transport-level failures retry and
    /// fail over like single calls; per-entry protocol errors are
    /// surfaced to the caller in the matching slot.
    pub async fn batch_call(
        &self,
        calls: &[(&str, Value)],
    ) -> Result<Vec<RpcResponse>, RpcClientError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let first_id = self.next_id.fetch_add(calls.len() as u64, Ordering::Relaxed);
        let requests: Vec<RpcRequest> = calls
            .iter()
            .enumerate()
            .map(|(i, (method, params))| RpcRequest::new(method, params.clone(), first_id + i as u64))
            .collect();
        let body = serde_json::to_value(&requests)
            .map_err(|e| RpcClientError::Config(format!("Unserializable batch: {}", e)))?;

        let raw = self
            .send_with_failover("batch", &body, classify_batch)
            .await?;

        let entries: Vec<RpcResponse> = serde_json::from_value(raw)
            .map_err(|e| RpcClientError::InvalidResponse(format!("Bad batch entry: {}", e)))?;

        let mut ordered: Vec<Option<RpcResponse>> = (0..requests.len()).map(|_| None).collect();
        for entry in entries {
            let slot = entry.id.checked_sub(first_id).map(|o| o as usize);
            match slot {
                Some(i) if i < ordered.len() => ordered[i] = Some(entry),
                _ => {
                    return Err(RpcClientError::InvalidResponse(format!(
                        "Batch response with unknown id {}",
                        entry.id
                    )))
                }
            }
        }

        ordered
            .into_iter()
            .enumerate()
            .map(|(i, entry)| {
                entry.ok_or_else(|| {
                    RpcClientError::InvalidResponse(format!(
                        "Batch response missing entry for request {}",
                        i
                    ))
                })
            })
            .collect()
    }

    /// Endpoint currently preferred by the rotation (diagnostics/tests)
    pub fn preferred_endpoint(&self) -> &str {
        let idx = self.preferred.load(Ordering::Relaxed) % self.endpoints.len();
        &self.endpoints[idx]
    }

    /// Send a body with sticky rotation, per-endpoint retry, and
    /// failover. `classify` turns the raw response into the caller's
    /// payload; retryable classification failures count against the
    /// current endpoint's budget.
    async fn send_with_failover(
        &self,
        label: &str,
        body: &Value,
        classify: fn(Value) -> Result<Value, RpcClientError>,
    ) -> Result<Value, RpcClientError> {
        let total_endpoints = self.endpoints.len();
        let start = self.preferred.load(Ordering::Relaxed) % total_endpoints;

        let mut attempts: u32 = 0;
        let mut last_error: Option<RpcClientError> = None;

        for offset in 0..total_endpoints {
            let index = (start + offset) % total_endpoints;
            let endpoint = &self.endpoints[index];

            for attempt in 0..self.max_attempts {
                attempts += 1;
                debug!(
                    "{}: attempt {}/{} against {}",
                    label,
                    attempt + 1,
                    self.max_attempts,
                    endpoint
                );

                let outcome = self
                    .transport
                    .post(endpoint, body)
                    .await
                    .and_then(classify);

                match outcome {
                    Ok(value) => {
                        self.preferred.store(index, Ordering::Relaxed);
                        return Ok(value);
                    }
                    Err(e) if e.is_retryable() => {
                        warn!(
                            "{} failed on {} (attempt {}/{}): {}",
                            label,
                            endpoint,
                            attempt + 1,
                            self.max_attempts,
                            e
                        );
                        last_error = Some(e);
                        if attempt + 1 < self.max_attempts {
                            tokio::time::sleep(self.backoff_delay(attempt)).await;
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Err(RpcClientError::AllEndpointsExhausted {
            endpoints: total_endpoints,
            attempts,
            last_error: Box::new(
                last_error.unwrap_or_else(|| RpcClientError::Transport("no attempts made".into())),
            ),
        })
    }

    fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(failed_attempt)
    }
}

/// Classify a single-call response: an `error` member is a Protocol
/// failure, a missing `result` is an invalid response. An explicit
/// `"result": null` is a valid answer (unknown block, pending receipt)
/// and passes through as `Value::Null` without touching the retry
/// budget.
fn classify_single(raw: Value) -> Result<Value, RpcClientError> {
    let mut response = match raw {
        Value::Object(fields) => fields,
        other => {
            return Err(RpcClientError::InvalidResponse(format!(
                "Response is not a JSON object: {}",
                other
            )))
        }
    };

    match response.remove("error") {
        Some(Value::Null) | None => {}
        Some(error) => {
            let error: crate::types::RpcErrorObject = serde_json::from_value(error)
                .map_err(|e| RpcClientError::InvalidResponse(format!("Bad error member: {}", e)))?;
            return Err(RpcClientError::Protocol {
                code: error.code,
                message: error.message,
            });
        }
    }

    response
        .remove("result")
        .ok_or_else(|| RpcClientError::InvalidResponse("Response has neither result nor error".into()))
}

/// Classify a batch response: anything but a JSON array is invalid.
/// Per-entry errors are left for the caller to surface.
fn classify_batch(raw: Value) -> Result<Value, RpcClientError> {
    if raw.is_array() {
        Ok(raw)
    } else {
        Err(RpcClientError::InvalidResponse(
            "Batch response is not an array".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Transport scripted per endpoint; records the endpoint of every
    /// post so tests can assert rotation order.
    struct MockTransport {
        responses: Mutex<HashMap<String, Vec<Result<Value, String>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Queue responses for an endpoint; the last entry repeats once
        /// the queue drains.
        fn script(&self, endpoint: &str, responses: Vec<Result<Value, String>>) {
            self.responses
                .lock()
                .unwrap()
                .insert(endpoint.to_string(), responses);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RpcTransport for MockTransport {
        async fn post(&self, endpoint: &str, _body: &Value) -> Result<Value, RpcClientError> {
            self.calls.lock().unwrap().push(endpoint.to_string());
            let mut responses = self.responses.lock().unwrap();
            let queue = responses
                .get_mut(endpoint)
                .unwrap_or_else(|| panic!("unscripted endpoint {}", endpoint));
            let next = if queue.len() > 1 {
                queue.remove(0)
            } else {
                queue[0].clone()
            };
            next.map_err(RpcClientError::Transport)
        }
    }

    fn fast_config(endpoints: &[&str]) -> RpcClientConfig {
        RpcClientConfig {
            endpoints: endpoints.iter().map(|s| s.to_string()).collect(),
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            request_timeout: Duration::from_secs(1),
        }
    }

    fn ok_result(value: Value) -> Result<Value, String> {
        Ok(json!({ "jsonrpc": "2.0", "result": value, "id": 0 }))
    }

    #[test]
    fn test_requires_endpoints() {
        let transport = Arc::new(MockTransport::new());
        let config = RpcClientConfig {
            endpoints: vec![],
            ..Default::default()
        };
        assert!(RpcClient::with_transport(config, transport).is_err());
    }

    #[test]
    fn test_rejects_bad_endpoint_url() {
        let transport = Arc::new(MockTransport::new());
        let config = fast_config(&["not a url"]);
        assert!(RpcClient::with_transport(config, transport).is_err());
    }

    #[tokio::test]
    async fn test_failover_to_second_endpoint() {
        let transport = Arc::new(MockTransport::new());
        transport.script("http://a", vec![Err("connection refused".into())]);
        transport.script("http://b", vec![ok_result(json!("0x64"))]);

        let client =
            RpcClient::with_transport(fast_config(&["http://a", "http://b"]), transport.clone())
                .unwrap();

        let result = client.call("eth_blockNumber", json!([])).await.unwrap();
        assert_eq!(result, json!("0x64"));

        // Both attempts against a, then b
        assert_eq!(
            transport.calls(),
            vec!["http://a", "http://a", "http://b"]
        );
    }

    #[tokio::test]
    async fn test_subsequent_calls_prefer_last_success() {
        let transport = Arc::new(MockTransport::new());
        transport.script("http://a", vec![Err("connection refused".into())]);
        transport.script("http://b", vec![ok_result(json!("0x1"))]);

        let client =
            RpcClient::with_transport(fast_config(&["http://a", "http://b"]), transport.clone())
                .unwrap();

        client.call("eth_blockNumber", json!([])).await.unwrap();
        assert_eq!(client.preferred_endpoint(), "http://b");

        client.call("eth_blockNumber", json!([])).await.unwrap();
        // Second call goes straight to b, never touching a again
        assert_eq!(
            transport.calls(),
            vec!["http://a", "http://a", "http://b", "http://b"]
        );
    }

    #[tokio::test]
    async fn test_protocol_error_is_retried_like_transport_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.script(
            "http://a",
            vec![
                Ok(json!({ "jsonrpc": "2.0", "error": { "code": -32000, "message": "busy" }, "id": 0 })),
                ok_result(json!("0x2")),
            ],
        );

        let client =
            RpcClient::with_transport(fast_config(&["http://a"]), transport.clone()).unwrap();

        let result = client.call("eth_blockNumber", json!([])).await.unwrap();
        assert_eq!(result, json!("0x2"));
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_all_endpoints_exhausted() {
        let transport = Arc::new(MockTransport::new());
        transport.script("http://a", vec![Err("timeout".into())]);
        transport.script("http://b", vec![Err("refused".into())]);

        let client =
            RpcClient::with_transport(fast_config(&["http://a", "http://b"]), transport.clone())
                .unwrap();

        let err = client.call("eth_blockNumber", json!([])).await.unwrap_err();
        match err {
            RpcClientError::AllEndpointsExhausted {
                endpoints,
                attempts,
                last_error,
            } => {
                assert_eq!(endpoints, 2);
                assert_eq!(attempts, 4); // 2 endpoints x 2 attempts
                assert!(matches!(*last_error, RpcClientError::Transport(_)));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_batch_responses_matched_by_id() {
        let transport = Arc::new(MockTransport::new());
        // Server returns entries out of order; ids are 1 and 2 because
        // the client's id counter starts at 1.
        transport.script(
            "http://a",
            vec![Ok(json!([
                { "jsonrpc": "2.0", "result": "0xbb", "id": 2 },
                { "jsonrpc": "2.0", "result": "0xaa", "id": 1 },
            ]))],
        );

        let client =
            RpcClient::with_transport(fast_config(&["http://a"]), transport.clone()).unwrap();

        let responses = client
            .batch_call(&[
                ("eth_getTransactionReceipt", json!(["0x01"])),
                ("eth_getTransactionReceipt", json!(["0x02"])),
            ])
            .await
            .unwrap();

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].result.as_ref().unwrap(), "0xaa");
        assert_eq!(responses[1].result.as_ref().unwrap(), "0xbb");
    }

    #[tokio::test]
    async fn test_explicit_null_result_passes_through_without_retry() {
        let transport = Arc::new(MockTransport::new());
        // Unknown block / pending receipt: a valid answer, not a fault.
        transport.script("http://a", vec![ok_result(Value::Null)]);

        let client =
            RpcClient::with_transport(fast_config(&["http://a"]), transport.clone()).unwrap();

        let result = client
            .call("eth_getTransactionReceipt", json!(["0x01"]))
            .await
            .unwrap();
        assert!(result.is_null());
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_result_is_invalid_response() {
        let transport = Arc::new(MockTransport::new());
        transport.script("http://a", vec![Ok(json!({ "jsonrpc": "2.0", "id": 0 }))]);

        let client =
            RpcClient::with_transport(fast_config(&["http://a"]), transport.clone()).unwrap();

        let err = client.call("eth_blockNumber", json!([])).await.unwrap_err();
        assert!(matches!(
            err,
            RpcClientError::AllEndpointsExhausted { .. }
        ));
    }
}
