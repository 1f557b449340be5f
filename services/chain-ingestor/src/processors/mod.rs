//! Chain-family processors
//!
//! Each chain family supplies one implementation per processor trait.
//! Processors decode RPC payloads into the normalized record types and
//! never touch the store; the orchestrator owns sequencing and writes.
//! Malformed payloads surface as Validation errors, which are terminal
//! for the block rather than retried.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use chain_common::{
    ChainFamily, NormalizedBlock, NormalizedContract, NormalizedReceipt, NormalizedTrace,
    NormalizedTransaction,
};
use rpc_client::RpcClient;

use crate::error::IngestError;

mod evm;
mod starknet;
pub mod wallet;

pub use evm::EvmProcessors;
pub use starknet::StarknetProcessors;

/// A fetched block plus its raw transaction payloads, ready for
/// per-transaction expansion.
#[derive(Debug, Clone)]
pub struct BlockBundle {
    pub block: NormalizedBlock,
    pub raw_transactions: Vec<Value>,
}

/// Block fields a transaction processor needs for denormalization
#[derive(Debug, Clone)]
pub struct BlockContext {
    pub block_number: u64,
    pub block_hash: String,
    pub block_timestamp: u64,
}

impl BlockContext {
    pub fn of(block: &NormalizedBlock) -> Self {
        Self {
            block_number: block.number,
            block_hash: block.hash.clone(),
            block_timestamp: block.timestamp,
        }
    }
}

/// Reads the chain tip height
#[async_trait]
pub trait HeadFetcher: Send + Sync {
    async fn head(&self) -> Result<u64, IngestError>;
}

/// Fetches one block with its transactions. `head` is the current tip,
/// used by families that derive finality from depth.
#[async_trait]
pub trait BlockProcessor: Send + Sync {
    async fn process(&self, height: u64, head: u64) -> Result<BlockBundle, IngestError>;
}

/// Decodes one raw transaction payload
pub trait TransactionProcessor: Send + Sync {
    fn process(&self, raw: &Value, ctx: &BlockContext)
        -> Result<NormalizedTransaction, IngestError>;
}

/// Fetches and decodes one transaction receipt
#[async_trait]
pub trait ReceiptProcessor: Send + Sync {
    async fn process(&self, tx_hash: &str) -> Result<NormalizedReceipt, IngestError>;
}

/// Fetches one transaction's execution trace as flattened call frames.
/// Nodes without trace support return an empty list.
#[async_trait]
pub trait TraceProcessor: Send + Sync {
    async fn process(&self, tx_hash: &str) -> Result<Vec<NormalizedTrace>, IngestError>;
}

/// Fetches all event logs emitted in one block
#[async_trait]
pub trait LogProcessor: Send + Sync {
    async fn process(&self, height: u64) -> Result<Vec<chain_common::NormalizedLog>, IngestError>;
}

/// Detects a contract deployment from a transaction and its receipt.
///
/// Detection relies on explicit deployment markers only; calldata
/// heuristics produce false positives and are deliberately absent.
#[async_trait]
pub trait ContractProcessor: Send + Sync {
    async fn process(
        &self,
        tx: &NormalizedTransaction,
        receipt: &NormalizedReceipt,
    ) -> Result<Option<NormalizedContract>, IngestError>;
}

/// The full processor complement for one chain
pub struct ProcessorSet {
    pub head: Arc<dyn HeadFetcher>,
    pub blocks: Arc<dyn BlockProcessor>,
    pub transactions: Arc<dyn TransactionProcessor>,
    pub receipts: Arc<dyn ReceiptProcessor>,
    pub traces: Arc<dyn TraceProcessor>,
    pub logs: Arc<dyn LogProcessor>,
    pub contracts: Arc<dyn ContractProcessor>,
}

impl ProcessorSet {
    /// Build the processor set for a chain family
    pub fn for_family(
        family: ChainFamily,
        client: Arc<RpcClient>,
        chain_id: &str,
        finality_depth: u64,
    ) -> Self {
        match family {
            ChainFamily::Evm => {
                let p = Arc::new(EvmProcessors::new(client, chain_id, finality_depth));
                Self {
                    head: p.clone(),
                    blocks: p.clone(),
                    transactions: p.clone(),
                    receipts: p.clone(),
                    traces: p.clone(),
                    logs: p.clone(),
                    contracts: p,
                }
            }
            ChainFamily::Starknet => {
                let p = Arc::new(StarknetProcessors::new(client, chain_id));
                Self {
                    head: p.clone(),
                    blocks: p.clone(),
                    transactions: p.clone(),
                    receipts: p.clone(),
                    traces: p.clone(),
                    logs: p.clone(),
                    contracts: p,
                }
            }
        }
    }
}

/// Receipts keyed by transaction hash
pub type ReceiptMap = HashMap<String, NormalizedReceipt>;
