//! Starknet-family processors (starknet_* dialect)
//!
//! Starknet differs from EVM in the places that matter here: block
//! status is an explicit field (no depth promotion), receipts carry the
//! actual fee directly, events double as logs, and deployments are
//! their own transaction types with a class hash.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use chain_common::{
    hex_to_decimal_string, FinalityStatus, NormalizedBlock, NormalizedContract, NormalizedLog,
    NormalizedReceipt, NormalizedTrace, NormalizedTransaction, TxStatus, ValidationError,
};
use rpc_client::{RpcClient, RpcClientError};

use crate::error::IngestError;

use super::{
    BlockBundle, BlockContext, BlockProcessor, ContractProcessor, HeadFetcher, LogProcessor,
    ReceiptProcessor, TraceProcessor, TransactionProcessor,
};

pub struct StarknetProcessors {
    client: Arc<RpcClient>,
    chain_id: String,
}

impl StarknetProcessors {
    pub fn new(client: Arc<RpcClient>, chain_id: &str) -> Self {
        Self {
            client,
            chain_id: chain_id.to_string(),
        }
    }
}

fn map_finality(status: &str) -> Result<FinalityStatus, ValidationError> {
    match status {
        "PENDING" => Ok(FinalityStatus::Pending),
        "ACCEPTED_ON_L2" => Ok(FinalityStatus::AcceptedOnL2),
        "ACCEPTED_ON_L1" => Ok(FinalityStatus::AcceptedOnL1),
        "REJECTED" => Ok(FinalityStatus::Rejected),
        other => Err(ValidationError::UnexpectedShape {
            field: "status".into(),
            reason: format!("unknown block status '{}'", other),
        }),
    }
}

#[async_trait]
impl HeadFetcher for StarknetProcessors {
    async fn head(&self) -> Result<u64, IngestError> {
        Ok(self.client.starknet_block_number().await?)
    }
}

#[async_trait]
impl BlockProcessor for StarknetProcessors {
    async fn process(&self, height: u64, _head: u64) -> Result<BlockBundle, IngestError> {
        let raw = self.client.starknet_block_with_txs(height).await?;
        if raw.is_null() {
            return Err(RpcClientError::InvalidResponse(format!(
                "Block {} not available yet",
                height
            ))
            .into());
        }

        let status = raw
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::MissingField("status".into()))?;

        let raw_transactions = raw
            .get("transactions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let block = NormalizedBlock {
            chain_id: self.chain_id.clone(),
            number: u64_field(&raw, "block_number")?,
            hash: str_field(&raw, "block_hash")?,
            parent_hash: str_field(&raw, "parent_hash")?,
            timestamp: u64_field(&raw, "timestamp")?,
            finality: map_finality(status)?,
            gas_used: None,
            gas_limit: None,
            transaction_count: raw_transactions.len() as u32,
            chain_specific: json!({
                "sequencer_address": raw.get("sequencer_address").cloned().unwrap_or(Value::Null),
                "new_root": raw.get("new_root").cloned().unwrap_or(Value::Null),
                "starknet_version": raw.get("starknet_version").cloned().unwrap_or(Value::Null),
            }),
        };

        Ok(BlockBundle {
            block,
            raw_transactions,
        })
    }
}

impl TransactionProcessor for StarknetProcessors {
    fn process(
        &self,
        raw: &Value,
        ctx: &BlockContext,
    ) -> Result<NormalizedTransaction, IngestError> {
        let tx_type = raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("INVOKE")
            .to_string();

        // INVOKE carries sender_address; DEPLOY/DEPLOY_ACCOUNT carry the
        // deployed contract_address as the acting account.
        let from_address = raw
            .get("sender_address")
            .or_else(|| raw.get("contract_address"))
            .and_then(Value::as_str)
            .unwrap_or("0x0")
            .to_string();

        let max_fee = match raw.get("max_fee").and_then(Value::as_str) {
            Some(v) => Some(hex_to_decimal_string(v)?),
            None => None,
        };

        Ok(NormalizedTransaction {
            chain_id: self.chain_id.clone(),
            tx_hash: str_field(raw, "transaction_hash")?,
            block_number: ctx.block_number,
            block_hash: ctx.block_hash.clone(),
            block_timestamp: ctx.block_timestamp,
            from_address,
            // No native recipient; calldata targets live in the trace
            to_address: None,
            value: "0".to_string(),
            gas_limit: None,
            gas_used: None,
            gas_price: None,
            fee: max_fee,
            status: TxStatus::Pending,
            input_data: raw
                .get("calldata")
                .and_then(Value::as_array)
                .map(|c| serde_json::to_string(c).unwrap_or_default()),
            chain_specific: json!({
                "type": tx_type,
                "version": raw.get("version").cloned().unwrap_or(Value::Null),
                "nonce": raw.get("nonce").cloned().unwrap_or(Value::Null),
                "class_hash": raw.get("class_hash").cloned().unwrap_or(Value::Null),
            }),
        })
    }
}

#[async_trait]
impl ReceiptProcessor for StarknetProcessors {
    async fn process(&self, tx_hash: &str) -> Result<NormalizedReceipt, IngestError> {
        let raw = self.client.starknet_transaction_receipt(tx_hash).await?;
        if raw.is_null() {
            return Err(RpcClientError::InvalidResponse(format!(
                "Receipt for {} not available",
                tx_hash
            ))
            .into());
        }

        let status = match raw.get("execution_status").and_then(Value::as_str) {
            Some("SUCCEEDED") => TxStatus::Succeeded,
            Some("REVERTED") => TxStatus::Reverted,
            _ => TxStatus::Succeeded,
        };

        // actual_fee is a hex felt in older nodes, {amount, unit} in newer
        let fee = match raw.get("actual_fee") {
            Some(Value::String(v)) => Some(hex_to_decimal_string(v)?),
            Some(Value::Object(obj)) => match obj.get("amount").and_then(Value::as_str) {
                Some(amount) => Some(hex_to_decimal_string(amount)?),
                None => None,
            },
            _ => None,
        };

        let logs = raw
            .get("events")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(NormalizedReceipt {
            tx_hash: tx_hash.to_string(),
            status,
            gas_used: None,
            effective_gas_price: None,
            fee,
            contract_address: raw
                .get("contract_address")
                .and_then(Value::as_str)
                .map(String::from),
            class_hash: None,
            logs,
        })
    }
}

#[async_trait]
impl TraceProcessor for StarknetProcessors {
    async fn process(&self, tx_hash: &str) -> Result<Vec<NormalizedTrace>, IngestError> {
        let raw = match self.client.starknet_trace_transaction(tx_hash).await {
            Ok(raw) => raw,
            Err(RpcClientError::Protocol { code, .. }) if code == -32601 => {
                debug!("Tracing unavailable for {}", tx_hash);
                return Ok(Vec::new());
            }
            Err(RpcClientError::AllEndpointsExhausted { ref last_error, .. })
                if matches!(**last_error, RpcClientError::Protocol { code: -32601, .. }) =>
            {
                debug!("Tracing unavailable for {}", tx_hash);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let invocation = raw
            .get("execute_invocation")
            .or_else(|| raw.get("constructor_invocation"))
            .or_else(|| raw.get("function_invocation"))
            .cloned()
            .unwrap_or(Value::Null);

        let mut frames = Vec::new();
        flatten_invocation(&invocation, tx_hash, 0, &mut frames);
        Ok(frames)
    }
}

#[async_trait]
impl LogProcessor for StarknetProcessors {
    async fn process(&self, height: u64) -> Result<Vec<NormalizedLog>, IngestError> {
        let raw = self.client.starknet_events_for_block(height).await?;
        let entries = raw
            .get("events")
            .and_then(Value::as_array)
            .ok_or_else(|| ValidationError::UnexpectedShape {
                field: "events".into(),
                reason: "starknet_getEvents result has no events array".into(),
            })?;

        let mut logs = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let keys = entry
                .get("keys")
                .and_then(Value::as_array)
                .map(|k| {
                    k.iter()
                        .filter_map(Value::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();
            logs.push(NormalizedLog {
                chain_id: self.chain_id.clone(),
                block_number: height,
                tx_hash: str_field(entry, "transaction_hash")?,
                log_index: index as u64,
                address: str_field(entry, "from_address")?,
                topics: keys,
                data: entry
                    .get("data")
                    .and_then(Value::as_array)
                    .map(|d| serde_json::to_string(d).unwrap_or_default()),
            });
        }
        Ok(logs)
    }
}

#[async_trait]
impl ContractProcessor for StarknetProcessors {
    async fn process(
        &self,
        tx: &NormalizedTransaction,
        receipt: &NormalizedReceipt,
    ) -> Result<Option<NormalizedContract>, IngestError> {
        // DEPLOY and DEPLOY_ACCOUNT receipts carry the new address; the
        // class hash comes from the transaction itself.
        let address = match &receipt.contract_address {
            Some(address) => address.clone(),
            None => return Ok(None),
        };

        let class_hash = tx
            .chain_specific
            .get("class_hash")
            .and_then(Value::as_str)
            .map(String::from);

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

fn flatten_invocation(frame: &Value, tx_hash: &str, depth: u32, out: &mut Vec<NormalizedTrace>) {
    if !frame.is_object() {
        return;
    }

    out.push(NormalizedTrace {
        tx_hash: tx_hash.to_string(),
        depth,
        call_type: frame
            .get("call_type")
            .and_then(Value::as_str)
            .unwrap_or("CALL")
            .to_string(),
        from_address: frame
            .get("caller_address")
            .and_then(Value::as_str)
            .map(String::from),
        to_address: frame
            .get("contract_address")
            .and_then(Value::as_str)
            .map(String::from),
        value: None,
        gas_used: None,
        error: frame
            .get("revert_reason")
            .and_then(Value::as_str)
            .map(String::from),
    });

    if let Some(calls) = frame.get("calls").and_then(Value::as_array) {
        for call in calls {
            flatten_invocation(call, tx_hash, depth + 1, out);
        }
    }
}

fn str_field(value: &Value, field: &str) -> Result<String, IngestError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| ValidationError::MissingField(field.to_string()).into())
}

fn u64_field(value: &Value, field: &str) -> Result<u64, IngestError> {
    value
        .get(field)
        .and_then(Value::as_u64)
        .ok_or_else(|| ValidationError::MissingField(field.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processors() -> StarknetProcessors {
        let client = Arc::new(
            RpcClient::new(rpc_client::RpcClientConfig::default()).unwrap(),
        );
        StarknetProcessors::new(client, "starknet-mainnet")
    }

    #[test]
    fn test_finality_mapping() {
        assert_eq!(map_finality("PENDING").unwrap(), FinalityStatus::Pending);
        assert_eq!(
            map_finality("ACCEPTED_ON_L2").unwrap(),
            FinalityStatus::AcceptedOnL2
        );
        assert_eq!(
            map_finality("ACCEPTED_ON_L1").unwrap(),
            FinalityStatus::AcceptedOnL1
        );
        assert_eq!(map_finality("REJECTED").unwrap(), FinalityStatus::Rejected);
        assert!(map_finality("ACCEPTED_ON_L3").is_err());
    }

    #[test]
    fn test_invoke_transaction_decoding() {
        let p = processors();
        let ctx = BlockContext {
            block_number: 500,
            block_hash: "0xb500".into(),
            block_timestamp: 1_700_000_000,
        };
        let raw = json!({
            "type": "INVOKE",
            "transaction_hash": "0xt1",
            "sender_address": "0xacc1",
            "max_fee": "0x38d7ea4c68000",
            "version": "0x1",
            "nonce": "0x5",
            "calldata": ["0x1", "0x2"],
        });

        let tx = TransactionProcessor::process(&p, &raw, &ctx).unwrap();
        assert_eq!(tx.from_address, "0xacc1");
        assert_eq!(tx.fee.as_deref(), Some("1000000000000000"));
        assert_eq!(tx.chain_specific["type"], "INVOKE");
        assert!(tx.to_address.is_none());
        assert_eq!(tx.value, "0");
    }

    #[test]
    fn test_deploy_account_uses_contract_address_as_sender() {
        let p = processors();
        let ctx = BlockContext {
            block_number: 500,
            block_hash: "0xb500".into(),
            block_timestamp: 0,
        };
        let raw = json!({
            "type": "DEPLOY_ACCOUNT",
            "transaction_hash": "0xt2",
            "contract_address": "0xnew",
            "class_hash": "0xclass",
        });

        let tx = TransactionProcessor::process(&p, &raw, &ctx).unwrap();
        assert_eq!(tx.from_address, "0xnew");
        assert_eq!(tx.chain_specific["class_hash"], "0xclass");
    }

    #[test]
    fn test_invocation_flattening() {
        let invocation = json!({
            "call_type": "CALL",
            "caller_address": "0x0",
            "contract_address": "0xacc1",
            "calls": [
                { "call_type": "DELEGATE", "caller_address": "0xacc1", "contract_address": "0ximpl" }
            ]
        });

        let mut frames = Vec::new();
        flatten_invocation(&invocation, "0xt1", 0, &mut frames);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].depth, 1);
        assert_eq!(frames[1].call_type, "DELEGATE");
    }
}
