//! Typed helpers over the raw `call` surface
//!
//! Thin wrappers that pick the right method name and params shape per
//! chain dialect. Payload decoding beyond simple quantities stays in
//! the chain-family processors.

use serde_json::{json, Value};

use chain_common::hex_to_u64;

use crate::client::RpcClient;
use crate::error::RpcClientError;

/// Filter for `eth_getLogs`
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub address: Option<String>,
    pub topics: Vec<String>,
}

impl LogFilter {
    /// Logs for exactly one block
    pub fn for_block(number: u64) -> Self {
        Self {
            from_block: Some(number),
            to_block: Some(number),
            ..Default::default()
        }
    }

    fn to_params(&self) -> Value {
        let mut filter = serde_json::Map::new();
        if let Some(from) = self.from_block {
            filter.insert("fromBlock".to_string(), json!(format!("{:#x}", from)));
        }
        if let Some(to) = self.to_block {
            filter.insert("toBlock".to_string(), json!(format!("{:#x}", to)));
        }
        if let Some(address) = &self.address {
            filter.insert("address".to_string(), json!(address));
        }
        if !self.topics.is_empty() {
            filter.insert("topics".to_string(), json!(self.topics));
        }
        json!([Value::Object(filter)])
    }
}

impl RpcClient {
    // ── EVM dialect ────────────────────────────────────────────────

    /// `eth_blockNumber`
    pub async fn current_block_number(&self) -> Result<u64, RpcClientError> {
        let raw = self.call("eth_blockNumber", json!([])).await?;
        let quantity = raw.as_str().ok_or_else(|| {
            RpcClientError::InvalidResponse("eth_blockNumber result is not a string".into())
        })?;
        Ok(hex_to_u64(quantity)?)
    }

    /// `eth_getBlockByNumber`; `full_transactions` expands tx objects
    pub async fn block_by_number(
        &self,
        number: u64,
        full_transactions: bool,
    ) -> Result<Value, RpcClientError> {
        self.call(
            "eth_getBlockByNumber",
            json!([format!("{:#x}", number), full_transactions]),
        )
        .await
    }

    /// `eth_getTransactionByHash`
    pub async fn transaction_by_hash(&self, tx_hash: &str) -> Result<Value, RpcClientError> {
        self.call("eth_getTransactionByHash", json!([tx_hash])).await
    }

    /// `eth_getTransactionReceipt`
    pub async fn transaction_receipt(&self, tx_hash: &str) -> Result<Value, RpcClientError> {
        self.call("eth_getTransactionReceipt", json!([tx_hash])).await
    }

    /// `eth_getLogs`
    pub async fn logs(&self, filter: &LogFilter) -> Result<Value, RpcClientError> {
        self.call("eth_getLogs", filter.to_params()).await
    }

    /// `debug_traceTransaction` with the call tracer
    pub async fn trace_transaction(&self, tx_hash: &str) -> Result<Value, RpcClientError> {
        self.call(
            "debug_traceTransaction",
            json!([tx_hash, { "tracer": "callTracer" }]),
        )
        .await
    }

    /// `eth_getCode` at the latest block
    pub async fn code_at(&self, address: &str) -> Result<Value, RpcClientError> {
        self.call("eth_getCode", json!([address, "latest"])).await
    }

    /// `eth_getStorageAt` at the latest block
    pub async fn storage_at(&self, address: &str, slot: &str) -> Result<Value, RpcClientError> {
        self.call("eth_getStorageAt", json!([address, slot, "latest"]))
            .await
    }

    // ── Starknet dialect ───────────────────────────────────────────

    /// `starknet_blockNumber` (plain integer result)
    pub async fn starknet_block_number(&self) -> Result<u64, RpcClientError> {
        let raw = self.call("starknet_blockNumber", json!([])).await?;
        raw.as_u64().ok_or_else(|| {
            RpcClientError::InvalidResponse("starknet_blockNumber result is not an integer".into())
        })
    }

    /// `starknet_getBlockWithTxs`
    pub async fn starknet_block_with_txs(&self, number: u64) -> Result<Value, RpcClientError> {
        self.call(
            "starknet_getBlockWithTxs",
            json!([{ "block_number": number }]),
        )
        .await
    }

    /// `starknet_getTransactionReceipt`
    pub async fn starknet_transaction_receipt(
        &self,
        tx_hash: &str,
    ) -> Result<Value, RpcClientError> {
        self.call("starknet_getTransactionReceipt", json!([tx_hash]))
            .await
    }

    /// `starknet_traceTransaction`
    pub async fn starknet_trace_transaction(&self, tx_hash: &str) -> Result<Value, RpcClientError> {
        self.call("starknet_traceTransaction", json!([tx_hash])).await
    }

    /// `starknet_getEvents` for exactly one block
    pub async fn starknet_events_for_block(&self, number: u64) -> Result<Value, RpcClientError> {
        self.call(
            "starknet_getEvents",
            json!([{
                "from_block": { "block_number": number },
                "to_block": { "block_number": number },
                "chunk_size": 1024,
            }]),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_params() {
        let filter = LogFilter::for_block(256);
        let params = filter.to_params();
        assert_eq!(params[0]["fromBlock"], "0x100");
        assert_eq!(params[0]["toBlock"], "0x100");
        assert!(params[0].get("address").is_none());
    }

    #[test]
    fn test_log_filter_with_address_and_topics() {
        let filter = LogFilter {
            from_block: Some(1),
            to_block: Some(2),
            address: Some("0xabc".to_string()),
            topics: vec!["0xddf252ad".to_string()],
        };
        let params = filter.to_params();
        assert_eq!(params[0]["address"], "0xabc");
        assert_eq!(params[0]["topics"][0], "0xddf252ad");
    }
}
