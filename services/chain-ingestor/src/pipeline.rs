//! Per-chain ingestion orchestrator
//!
//! Drives one chain through the per-block pipeline:
//!
//!   Fetching -> ExpandingTransactions -> FetchingDetail
//!     -> DetectingContracts -> UpdatingWallets -> CommittingSyncState
//!
//! A failure at any stage abandons the whole block; the sync cursor only
//! advances after every write for the block has committed, so a crash
//! mid-block re-ingests it and the idempotent upserts absorb the replay.
//! Blocks are processed strictly in order; concurrency exists only in
//! the per-transaction detail fan-out, capped by configuration.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use chain_common::NormalizedContract;
use lake_store::{SharedConnection, SyncStateManager, UnifiedStore};

use crate::config::ChainConfig;
use crate::error::{IngestError, PipelineStage};
use crate::processors::{wallet, BlockContext, ProcessorSet, ReceiptMap};

pub struct ChainOrchestrator {
    chain_id: String,
    processors: ProcessorSet,
    store: UnifiedStore,
    sync: SyncStateManager,
    max_concurrent_fetches: usize,
    reorg_depth: u64,
    finality_depth: u64,
    poll_interval: Duration,
    error_backoff: Duration,
}

impl ChainOrchestrator {
    pub fn new(chain: &ChainConfig, processors: ProcessorSet, conn: SharedConnection) -> Self {
        Self {
            chain_id: chain.chain_id.clone(),
            processors,
            store: UnifiedStore::new(conn.clone(), &chain.chain_id),
            sync: SyncStateManager::new(conn, &chain.chain_id),
            max_concurrent_fetches: chain.max_concurrent_fetches,
            reorg_depth: chain.reorg_depth,
            finality_depth: chain.finality_depth,
            poll_interval: chain.poll_interval(),
            error_backoff: chain.error_backoff(),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Ingest one block end to end. `head` is the tip height observed
    /// by the caller, used for depth-derived finality.
    pub async fn process_block(&self, height: u64, head: u64) -> Result<(), IngestError> {
        let staged = |stage: PipelineStage| {
            let chain_id = self.chain_id.clone();
            move |e: IngestError| IngestError::at_block(chain_id, height, stage, e)
        };

        let bundle = self
            .processors
            .blocks
            .process(height, head)
            .await
            .map_err(staged(PipelineStage::Fetching))?;

        let ctx = BlockContext::of(&bundle.block);
        let mut transactions = bundle
            .raw_transactions
            .iter()
            .map(|raw| self.processors.transactions.process(raw, &ctx))
            .collect::<Result<Vec<_>, _>>()
            .map_err(staged(PipelineStage::ExpandingTransactions))?;

        // Receipts and traces per transaction, plus the block's logs,
        // with bounded fan-out. The stream owns everything it touches
        // so the future stays spawnable.
        let tx_hashes: Vec<String> = transactions.iter().map(|tx| tx.tx_hash.clone()).collect();
        let receipt_proc = self.processors.receipts.clone();
        let trace_proc = self.processors.traces.clone();
        let detail: Vec<(String, chain_common::NormalizedReceipt, usize)> =
            stream::iter(tx_hashes.into_iter().map(move |tx_hash| {
                let receipts = receipt_proc.clone();
                let traces = trace_proc.clone();
                async move {
                    let receipt = receipts.process(&tx_hash).await?;
                    let frames = traces.process(&tx_hash).await?;
                    Ok::<_, IngestError>((tx_hash, receipt, frames.len()))
                }
            }))
            .buffer_unordered(self.max_concurrent_fetches)
            .try_collect()
            .await
            .map_err(staged(PipelineStage::FetchingDetail))?;

        let logs = self
            .processors
            .logs
            .process(height)
            .await
            .map_err(staged(PipelineStage::FetchingDetail))?;

        let tx_index: HashMap<String, usize> = transactions
            .iter()
            .enumerate()
            .map(|(i, tx)| (tx.tx_hash.clone(), i))
            .collect();

        let mut receipts = ReceiptMap::new();
        for (tx_hash, receipt, internal_calls) in detail {
            if let Some(&slot) = tx_index.get(&tx_hash) {
                let tx = &mut transactions[slot];
                tx.status = receipt.status;
                tx.gas_used = receipt.gas_used.or(tx.gas_used);
                if receipt.fee.is_some() {
                    tx.fee = receipt.fee.clone();
                }
                if let Some(obj) = tx.chain_specific.as_object_mut() {
                    obj.insert("internal_call_count".to_string(), json!(internal_calls));
                }
            }
            receipts.insert(tx_hash, receipt);
        }

        let mut contracts: Vec<NormalizedContract> = Vec::new();
        for tx in &transactions {
            if let Some(receipt) = receipts.get(&tx.tx_hash) {
                if let Some(contract) = self
                    .processors
                    .contracts
                    .process(tx, receipt)
                    .await
                    .map_err(staged(PipelineStage::DetectingContracts))?
                {
                    contracts.push(contract);
                }
            }
        }

        // All writes for the block, parent entities first.
        let activity = wallet::aggregate(&bundle.block, &transactions, &receipts, &contracts);
        let write = || -> Result<(), IngestError> {
            self.store.insert_block(&bundle.block)?;
            for tx in &transactions {
                self.store.insert_transaction(tx)?;
            }
            for contract in &contracts {
                self.store.insert_contract(contract)?;
            }
            for update in &activity.updates {
                self.store.insert_wallet_activity(update)?;
            }
            for interaction in &activity.interactions {
                self.store.insert_wallet_interaction(interaction)?;
            }
            for log in &logs {
                self.store
                    .touch_wallet(&log.address, log.block_number, bundle.block.timestamp)?;
            }

            let touched: HashSet<&str> = activity
                .interactions
                .iter()
                .map(|i| i.contract_address.as_str())
                .collect();
            for contract_address in touched {
                self.store.update_contract_metrics(contract_address)?;
            }
            Ok(())
        };
        write().map_err(staged(PipelineStage::UpdatingWallets))?;

        let commit = || -> Result<(), IngestError> {
            if height > self.sync.last_synced()? {
                self.sync.set_last_synced(height)?;
            }
            Ok(())
        };
        commit().map_err(staged(PipelineStage::CommittingSyncState))?;

        debug!(
            "Ingested block {} on {}: {} txs, {} contracts, {} wallet updates",
            height,
            self.chain_id,
            transactions.len(),
            contracts.len(),
            activity.updates.len()
        );
        Ok(())
    }

    /// Ingest an inclusive range strictly in order
    pub async fn process_range(
        &self,
        range: RangeInclusive<u64>,
        head: u64,
    ) -> Result<u64, IngestError> {
        let mut processed = 0;
        for height in range {
            self.process_block(height, head).await?;
            processed += 1;
        }
        Ok(processed)
    }

    /// One live-sync cycle: read the head, re-ingest the reorg-safety
    /// window up to it, then advance the finalized watermark. Returns
    /// the number of blocks processed.
    pub async fn run_cycle(&self) -> Result<u64, IngestError> {
        let head = self.processors.head.head().await?;
        let last_synced = self.sync.last_synced()?;

        let window = match sync_window(last_synced, self.reorg_depth, head) {
            Some(window) => window,
            None => {
                debug!(
                    "Chain {} idle: head {} already behind cursor {}",
                    self.chain_id, head, last_synced
                );
                return Ok(0);
            }
        };

        info!(
            "Chain {}: syncing blocks {}..={} (head {})",
            self.chain_id,
            window.start(),
            window.end(),
            head
        );
        let processed = self.process_range(window, head).await?;

        self.sync
            .set_last_finalized(head.saturating_sub(self.finality_depth))?;
        Ok(processed)
    }

    /// Live-sync loop; runs until the shutdown channel flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting live sync for {} (reorg depth {}, poll {:?})",
            self.chain_id, self.reorg_depth, self.poll_interval
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.run_cycle().await {
                Ok(processed) => {
                    if processed > 0 {
                        debug!("Chain {}: cycle processed {} blocks", self.chain_id, processed);
                    }
                    self.poll_interval
                }
                Err(e) => {
                    warn!("Chain {}: sync cycle failed: {}", self.chain_id, e);
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Live sync stopped for {}", self.chain_id);
    }
}

/// The window a cycle re-ingests: `reorg_depth` blocks behind the
/// cursor through the head, or nothing when the head is behind it.
fn sync_window(last_synced: u64, reorg_depth: u64, head: u64) -> Option<RangeInclusive<u64>> {
    let start = last_synced.saturating_sub(reorg_depth);
    if head < start {
        return None;
    }
    Some(start..=head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_window_from_genesis() {
        assert_eq!(sync_window(0, 10, 5), Some(0..=5));
    }

    #[test]
    fn test_sync_window_rewinds_by_reorg_depth() {
        assert_eq!(sync_window(100, 10, 103), Some(90..=103));
    }

    #[test]
    fn test_sync_window_clamps_at_zero() {
        assert_eq!(sync_window(4, 10, 6), Some(0..=6));
    }

    #[test]
    fn test_sync_window_empty_when_head_far_behind() {
        assert_eq!(sync_window(100, 10, 80), None);
    }
}
