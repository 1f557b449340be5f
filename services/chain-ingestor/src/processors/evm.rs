//! EVM-family processors (eth_* / debug_* dialect)

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use chain_common::{
    hex_to_decimal_string, hex_to_u64, FinalityStatus, NormalizedBlock, NormalizedContract,
    NormalizedLog, NormalizedReceipt, NormalizedTrace, NormalizedTransaction, TxStatus,
    ValidationError,
};
use rpc_client::{LogFilter, RpcClient, RpcClientError};

use crate::error::IngestError;

use super::{
    BlockBundle, BlockContext, BlockProcessor, ContractProcessor, HeadFetcher, LogProcessor,
    ReceiptProcessor, TraceProcessor, TransactionProcessor,
};

pub struct EvmProcessors {
    client: Arc<RpcClient>,
    chain_id: String,
    finality_depth: u64,
}

impl EvmProcessors {
    pub fn new(client: Arc<RpcClient>, chain_id: &str, finality_depth: u64) -> Self {
        Self {
            client,
            chain_id: chain_id.to_string(),
            finality_depth,
        }
    }

    /// EVM has no finality field; promote by confirmation depth.
    fn finality_for(&self, height: u64, head: u64) -> FinalityStatus {
        let depth = head.saturating_sub(height);
        if depth >= self.finality_depth {
            FinalityStatus::AcceptedOnL1
        } else if depth >= 1 {
            FinalityStatus::AcceptedOnL2
        } else {
            FinalityStatus::Pending
        }
    }
}

#[async_trait]
impl HeadFetcher for EvmProcessors {
    async fn head(&self) -> Result<u64, IngestError> {
        Ok(self.client.current_block_number().await?)
    }
}

#[async_trait]
impl BlockProcessor for EvmProcessors {
    async fn process(&self, height: u64, head: u64) -> Result<BlockBundle, IngestError> {
        let raw = self.client.block_by_number(height, true).await?;
        if raw.is_null() {
            return Err(RpcClientError::InvalidResponse(format!(
                "Block {} not available yet",
                height
            ))
            .into());
        }

        let number = hex_u64_field(&raw, "number")?;
        if number != height {
            return Err(ValidationError::UnexpectedShape {
                field: "number".into(),
                reason: format!("requested block {} but node returned {}", height, number),
            }
            .into());
        }

        let raw_transactions = raw
            .get("transactions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let block = NormalizedBlock {
            chain_id: self.chain_id.clone(),
            number,
            hash: str_field(&raw, "hash")?,
            parent_hash: str_field(&raw, "parentHash")?,
            timestamp: hex_u64_field(&raw, "timestamp")?,
            finality: self.finality_for(height, head),
            gas_used: opt_hex_u64_field(&raw, "gasUsed")?,
            gas_limit: opt_hex_u64_field(&raw, "gasLimit")?,
            transaction_count: raw_transactions.len() as u32,
            chain_specific: json!({
                "miner": raw.get("miner").cloned().unwrap_or(Value::Null),
                "base_fee_per_gas": raw.get("baseFeePerGas").cloned().unwrap_or(Value::Null),
                "state_root": raw.get("stateRoot").cloned().unwrap_or(Value::Null),
            }),
        };

        Ok(BlockBundle {
            block,
            raw_transactions,
        })
    }
}

impl TransactionProcessor for EvmProcessors {
    fn process(
        &self,
        raw: &Value,
        ctx: &BlockContext,
    ) -> Result<NormalizedTransaction, IngestError> {
        let value = match raw.get("value").and_then(Value::as_str) {
            Some(v) => hex_to_decimal_string(v)?,
            None => "0".to_string(),
        };
        let gas_price = match raw.get("gasPrice").and_then(Value::as_str) {
            Some(v) => Some(hex_to_decimal_string(v)?),
            None => None,
        };

        Ok(NormalizedTransaction {
            chain_id: self.chain_id.clone(),
            tx_hash: str_field(raw, "hash")?,
            block_number: ctx.block_number,
            block_hash: ctx.block_hash.clone(),
            block_timestamp: ctx.block_timestamp,
            from_address: str_field(raw, "from")?,
            to_address: opt_str_field(raw, "to"),
            value,
            gas_limit: opt_hex_u64_field(raw, "gas")?,
            gas_used: None,
            gas_price,
            fee: None,
            status: TxStatus::Pending,
            input_data: opt_str_field(raw, "input"),
            chain_specific: json!({
                "nonce": raw.get("nonce").cloned().unwrap_or(Value::Null),
                "transaction_index": raw.get("transactionIndex").cloned().unwrap_or(Value::Null),
                "type": raw.get("type").cloned().unwrap_or(Value::Null),
            }),
        })
    }
}

#[async_trait]
impl ReceiptProcessor for EvmProcessors {
    async fn process(&self, tx_hash: &str) -> Result<NormalizedReceipt, IngestError> {
        let raw = self.client.transaction_receipt(tx_hash).await?;
        if raw.is_null() {
            return Err(RpcClientError::InvalidResponse(format!(
                "Receipt for {} not available",
                tx_hash
            ))
            .into());
        }

        let status = match raw.get("status").and_then(Value::as_str) {
            Some("0x1") => TxStatus::Succeeded,
            Some("0x0") => TxStatus::Reverted,
            // Pre-Byzantium receipts have no status field
            _ => TxStatus::Succeeded,
        };

        let gas_used = opt_hex_u64_field(&raw, "gasUsed")?;
        let effective_gas_price = match raw.get("effectiveGasPrice").and_then(Value::as_str) {
            Some(v) => Some(hex_to_decimal_string(v)?),
            None => None,
        };

        // fee = gasUsed * effectiveGasPrice, both known post-execution
        let fee = match (gas_used, &effective_gas_price) {
            (Some(gas), Some(price)) => price
                .parse::<u128>()
                .ok()
                .and_then(|p| p.checked_mul(gas as u128))
                .map(|f| f.to_string()),
            _ => None,
        };

        let logs = raw
            .get("logs")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(NormalizedReceipt {
            tx_hash: tx_hash.to_string(),
            status,
            gas_used,
            effective_gas_price,
            fee,
            contract_address: opt_str_field(&raw, "contractAddress"),
            class_hash: None,
            logs,
        })
    }
}

#[async_trait]
impl TraceProcessor for EvmProcessors {
    async fn process(&self, tx_hash: &str) -> Result<Vec<NormalizedTrace>, IngestError> {
        let raw = match self.client.trace_transaction(tx_hash).await {
            Ok(raw) => raw,
            // Nodes without the debug namespace reject the method on
            // every endpoint; ingest the block without traces.
            Err(e) if is_method_not_found(&e) => {
                debug!("Tracing unavailable for {}: {}", tx_hash, e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut frames = Vec::new();
        flatten_call_frame(&raw, tx_hash, 0, &mut frames)?;
        Ok(frames)
    }
}

#[async_trait]
impl LogProcessor for EvmProcessors {
    async fn process(&self, height: u64) -> Result<Vec<NormalizedLog>, IngestError> {
        let raw = self.client.logs(&LogFilter::for_block(height)).await?;
        let entries = raw.as_array().ok_or_else(|| ValidationError::UnexpectedShape {
            field: "logs".into(),
            reason: "eth_getLogs result is not an array".into(),
        })?;

        let mut logs = Vec::with_capacity(entries.len());
        for entry in entries {
            let topics = entry
                .get("topics")
                .and_then(Value::as_array)
                .map(|t| {
                    t.iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            logs.push(NormalizedLog {
                chain_id: self.chain_id.clone(),
                block_number: height,
                tx_hash: str_field(entry, "transactionHash")?,
                log_index: hex_u64_field(entry, "logIndex")?,
                address: str_field(entry, "address")?,
                topics,
                data: opt_str_field(entry, "data"),
            });
        }
        Ok(logs)
    }
}

#[async_trait]
impl ContractProcessor for EvmProcessors {
    async fn process(
        &self,
        tx: &NormalizedTransaction,
        receipt: &NormalizedReceipt,
    ) -> Result<Option<NormalizedContract>, IngestError> {
        // The only reliable deployment marker on EVM
        let address = match &receipt.contract_address {
            Some(address) => address.clone(),
            None => return Ok(None),
        };

        let code = self.client.code_at(&address).await?;
        let class_hash = code
            .as_str()
            .and_then(|c| c.strip_prefix("0x"))
            .filter(|c| !c.is_empty())
            .and_then(|c| hex::decode(c).ok())
            .map(|bytes| format!("0x{}", hex::encode(Sha256::digest(&bytes))));

        Ok(Some(NormalizedContract {
            chain_id: self.chain_id.clone(),
            contract_address: address,
            deployer_address: tx.from_address.clone(),
            deployment_tx_hash: tx.tx_hash.clone(),
            deployment_block_number: tx.block_number,
            class_hash,
            is_verified: false,
        }))
    }
}

/// Flatten the callTracer's nested frames depth-first
fn flatten_call_frame(
    frame: &Value,
    tx_hash: &str,
    depth: u32,
    out: &mut Vec<NormalizedTrace>,
) -> Result<(), IngestError> {
    if frame.is_null() {
        return Ok(());
    }

    let value = match frame.get("value").and_then(Value::as_str) {
        Some(v) => Some(hex_to_decimal_string(v)?),
        None => None,
    };

    out.push(NormalizedTrace {
        tx_hash: tx_hash.to_string(),
        depth,
        call_type: frame
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("CALL")
            .to_string(),
        from_address: opt_str_field(frame, "from"),
        to_address: opt_str_field(frame, "to"),
        value,
        gas_used: opt_hex_u64_field(frame, "gasUsed")?,
        error: opt_str_field(frame, "error"),
    });

    if let Some(calls) = frame.get("calls").and_then(Value::as_array) {
        for call in calls {
            flatten_call_frame(call, tx_hash, depth + 1, out)?;
        }
    }
    Ok(())
}

fn is_method_not_found(error: &RpcClientError) -> bool {
    match error {
        RpcClientError::Protocol { code, .. } => *code == -32601,
        RpcClientError::AllEndpointsExhausted { last_error, .. } => is_method_not_found(last_error),
        _ => false,
    }
}

fn str_field(value: &Value, field: &str) -> Result<String, IngestError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| ValidationError::MissingField(field.to_string()).into())
}

fn opt_str_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(Value::as_str).map(String::from)
}

fn hex_u64_field(value: &Value, field: &str) -> Result<u64, IngestError> {
    let raw = value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationError::MissingField(field.to_string()))?;
    Ok(hex_to_u64(raw)?)
}

fn opt_hex_u64_field(value: &Value, field: &str) -> Result<Option<u64>, IngestError> {
    match value.get(field).and_then(Value::as_str) {
        Some(raw) => Ok(Some(hex_to_u64(raw)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processors() -> EvmProcessors {
        let client = Arc::new(
            RpcClient::new(rpc_client::RpcClientConfig::default()).unwrap(),
        );
        EvmProcessors::new(client, "eth-mainnet", 64)
    }

    #[test]
    fn test_finality_promotion_by_depth() {
        let p = processors();
        assert_eq!(p.finality_for(100, 100), FinalityStatus::Pending);
        assert_eq!(p.finality_for(100, 101), FinalityStatus::AcceptedOnL2);
        assert_eq!(p.finality_for(100, 163), FinalityStatus::AcceptedOnL2);
        assert_eq!(p.finality_for(100, 164), FinalityStatus::AcceptedOnL1);
    }

    #[test]
    fn test_transaction_decoding() {
        let p = processors();
        let ctx = BlockContext {
            block_number: 100,
            block_hash: "0xb100".into(),
            block_timestamp: 1_700_000_000,
        };
        let raw = json!({
            "hash": "0xt1",
            "from": "0xalice",
            "to": "0xbob",
            "value": "0xde0b6b3a7640000",
            "gas": "0x5208",
            "gasPrice": "0x4a817c800",
            "input": "0x",
            "nonce": "0x7",
        });

        let tx = TransactionProcessor::process(&p, &raw, &ctx).unwrap();
        assert_eq!(tx.value, "1000000000000000000");
        assert_eq!(tx.gas_limit, Some(21_000));
        assert_eq!(tx.gas_price.as_deref(), Some("20000000000"));
        assert_eq!(tx.to_address.as_deref(), Some("0xbob"));
        assert_eq!(tx.status, TxStatus::Pending);
        assert_eq!(tx.chain_specific["nonce"], "0x7");
    }

    #[test]
    fn test_transaction_missing_hash_is_validation_error() {
        let p = processors();
        let ctx = BlockContext {
            block_number: 1,
            block_hash: "0xb1".into(),
            block_timestamp: 0,
        };
        let err = TransactionProcessor::process(&p, &json!({"from": "0xa"}), &ctx).unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
    }

    #[test]
    fn test_trace_flattening_preserves_depth() {
        let frame = json!({
            "type": "CALL",
            "from": "0xa",
            "to": "0xb",
            "value": "0x0",
            "gasUsed": "0x100",
            "calls": [
                { "type": "STATICCALL", "from": "0xb", "to": "0xc", "gasUsed": "0x10" },
                {
                    "type": "DELEGATECALL", "from": "0xb", "to": "0xd",
                    "calls": [{ "type": "CALL", "from": "0xd", "to": "0xe", "error": "out of gas" }]
                }
            ]
        });

        let mut frames = Vec::new();
        flatten_call_frame(&frame, "0xt1", 0, &mut frames).unwrap();

        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].depth, 0);
        assert_eq!(frames[1].depth, 1);
        assert_eq!(frames[2].depth, 1);
        assert_eq!(frames[3].depth, 2);
        assert_eq!(frames[3].error.as_deref(), Some("out of gas"));
    }
}
