//! JSON-RPC 2.0 request/response shapes

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// RPC request structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
    pub id: u64,
}

impl RpcRequest {
    pub fn new(method: &str, params: Value, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id,
        }
    }
}

/// RPC response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
    #[serde(default)]
    pub id: u64,
}

/// Structured error returned inside a JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let request = RpcRequest::new("eth_blockNumber", json!([]), 7);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["method"], "eth_blockNumber");
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn test_response_with_error_member() {
        let raw = json!({
            "jsonrpc": "2.0",
            "error": { "code": -32601, "message": "method not found" },
            "id": 1
        });
        let response: RpcResponse = serde_json::from_value(raw).unwrap();
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[test]
    fn test_response_tolerates_missing_fields() {
        let raw = json!({ "result": "0x1" });
        let response: RpcResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.result.unwrap(), "0x1");
        assert_eq!(response.id, 0);
    }
}
