//! Per-chain sync progress tracking
//!
//! One row per chain records how far ingestion has advanced and the
//! highest block known to be final. A chain with no row has never been
//! synced and reads back as height 0.

use chrono::Utc;
use duckdb::params;
use tracing::debug;

use crate::connection::{lock, SharedConnection};
use crate::error::StoreError;

/// Snapshot of one chain's sync progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    pub chain_id: String,
    pub last_synced_block: u64,
    pub last_finalized_block: u64,
}

/// Reads and advances the sync cursor for one chain
pub struct SyncStateManager {
    conn: SharedConnection,
    chain_id: String,
}

impl SyncStateManager {
    pub fn new(conn: SharedConnection, chain_id: impl Into<String>) -> Self {
        Self {
            conn,
            chain_id: chain_id.into(),
        }
    }

    /// Current state, defaulting to zeros for a never-synced chain
    pub fn get(&self) -> Result<SyncState, StoreError> {
        let guard = lock(&self.conn)?;
        let result = guard.query_row(
            "SELECT last_synced_block, last_finalized_block
             FROM sync_state WHERE chain_id = ?",
            params![self.chain_id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        );
        match result {
            Ok((synced, finalized)) => Ok(SyncState {
                chain_id: self.chain_id.clone(),
                last_synced_block: synced as u64,
                last_finalized_block: finalized as u64,
            }),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(SyncState {
                chain_id: self.chain_id.clone(),
                last_synced_block: 0,
                last_finalized_block: 0,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn last_synced(&self) -> Result<u64, StoreError> {
        Ok(self.get()?.last_synced_block)
    }

    pub fn last_finalized(&self) -> Result<u64, StoreError> {
        Ok(self.get()?.last_finalized_block)
    }

    /// Record a fully committed block height. The cursor only moves
    /// after every entity of the block has been stored, so a crash
    /// between block commit and cursor write re-ingests the block
    /// rather than skipping it.
    pub fn set_last_synced(&self, height: u64) -> Result<(), StoreError> {
        let guard = lock(&self.conn)?;
        guard.execute(
            "INSERT INTO sync_state
                 (chain_id, last_synced_block, last_finalized_block, updated_at)
             VALUES (?, ?, 0, ?)
             ON CONFLICT (chain_id) DO UPDATE SET
                 last_synced_block = excluded.last_synced_block,
                 updated_at = excluded.updated_at",
            params![self.chain_id, height as i64, Utc::now().to_rfc3339()],
        )?;
        debug!("Chain {} synced through block {}", self.chain_id, height);
        Ok(())
    }

    /// Advance the finalized watermark; never moves it backwards.
    pub fn set_last_finalized(&self, height: u64) -> Result<(), StoreError> {
        let guard = lock(&self.conn)?;
        guard.execute(
            "INSERT INTO sync_state
                 (chain_id, last_synced_block, last_finalized_block, updated_at)
             VALUES (?, 0, ?, ?)
             ON CONFLICT (chain_id) DO UPDATE SET
                 last_finalized_block = GREATEST(last_finalized_block, excluded.last_finalized_block),
                 updated_at = excluded.updated_at",
            params![self.chain_id, height as i64, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
