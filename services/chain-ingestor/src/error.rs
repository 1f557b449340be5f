//! Ingestion error types

use std::fmt;

use thiserror::Error;

use chain_common::ValidationError;
use lake_store::StoreError;
use rpc_client::RpcClientError;

/// Stage of the per-block pipeline, carried in block-level errors so a
/// failure names exactly where the block was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Fetching,
    ExpandingTransactions,
    FetchingDetail,
    DetectingContracts,
    UpdatingWallets,
    CommittingSyncState,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Fetching => "fetching",
            PipelineStage::ExpandingTransactions => "expanding_transactions",
            PipelineStage::FetchingDetail => "fetching_detail",
            PipelineStage::DetectingContracts => "detecting_contracts",
            PipelineStage::UpdatingWallets => "updating_wallets",
            PipelineStage::CommittingSyncState => "committing_sync_state",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcClientError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Block {height} on {chain_id} failed during {stage}: {source}")]
    Block {
        chain_id: String,
        height: u64,
        stage: PipelineStage,
        #[source]
        source: Box<IngestError>,
    },
}

impl IngestError {
    /// Wrap an inner failure with block-level diagnostics
    pub fn at_block(
        chain_id: impl Into<String>,
        height: u64,
        stage: PipelineStage,
        source: IngestError,
    ) -> Self {
        IngestError::Block {
            chain_id: chain_id.into(),
            height,
            stage,
            source: Box::new(source),
        }
    }
}
