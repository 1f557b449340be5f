//! Unified database adapter
//!
//! The single write path into the cross-chain schema. One adapter
//! instance is bound to exactly one `chain_id`; every insert is an
//! upsert keyed by the entity's natural key, so re-ingesting a block
//! after a crash or during the reorg-safety rewind is a no-op for
//! already-correct rows and a correcting update for changed ones.

use chrono::Utc;
use duckdb::params;
use serde_json::Value;
use tracing::{debug, info};

use chain_common::{
    FinalityStatus, NormalizedBlock, NormalizedContract, NormalizedTransaction, WalletInteraction,
    WalletUpdate,
};

use crate::connection::{lock, SharedConnection};
use crate::error::StoreError;

/// Block row as stored
#[derive(Debug, Clone)]
pub struct BlockRow {
    pub block_number: u64,
    pub block_hash: String,
    pub parent_hash: Option<String>,
    pub block_timestamp: u64,
    pub finality: FinalityStatus,
    pub is_active: bool,
    pub transaction_count: u32,
}

/// Wallet row as stored
#[derive(Debug, Clone)]
pub struct WalletRow {
    pub wallet_address: String,
    pub first_seen_block: u64,
    pub last_activity_at: u64,
    pub total_transactions: u64,
    pub wallet_type: String,
}

/// Contract row as stored
#[derive(Debug, Clone)]
pub struct ContractRow {
    pub contract_address: String,
    pub deployer_address: String,
    pub deployment_tx_hash: String,
    pub deployment_block_number: u64,
    pub class_hash: Option<String>,
    pub is_verified: bool,
}

/// Transaction row as stored
#[derive(Debug, Clone)]
pub struct TransactionRow {
    pub tx_hash: String,
    pub block_number: u64,
    pub block_hash: String,
    pub from_address: String,
    pub to_address: Option<String>,
    pub value: String,
    pub status: String,
}

/// Realtime per-contract aggregate row
#[derive(Debug, Clone)]
pub struct ContractMetricsRow {
    pub total_transactions: u64,
    pub unique_users: u64,
    pub total_volume: String,
    pub last_24h_transactions: u64,
}

/// Write path into the unified schema, bound to one chain
pub struct UnifiedStore {
    conn: SharedConnection,
    chain_id: String,
}

impl UnifiedStore {
    pub fn new(conn: SharedConnection, chain_id: impl Into<String>) -> Self {
        Self {
            conn,
            chain_id: chain_id.into(),
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Upsert a block by `(chain_id, block_hash)`.
    ///
    /// Any active block at the same height with a different hash is
    /// first marked inactive (reorg); its row is retained, never
    /// deleted. Re-inserting a hash that was previously deactivated
    /// reactivates it, so at most one block per height is active.
    pub fn insert_block(&self, block: &NormalizedBlock) -> Result<(), StoreError> {
        let guard = lock(&self.conn)?;

        let displaced = guard.execute(
            "UPDATE blocks SET is_active = false
             WHERE chain_id = ? AND block_number = ? AND block_hash <> ? AND is_active",
            params![self.chain_id, block.number as i64, block.hash],
        )?;
        if displaced > 0 {
            info!(
                "Reorg at height {}: deactivated {} block(s) on chain {}",
                block.number, displaced, self.chain_id
            );
        }

        guard.execute(
            "INSERT INTO blocks
                 (chain_id, block_number, block_hash, parent_hash, block_timestamp,
                  finality_status, is_active, gas_used, gas_limit, transaction_count,
                  chain_specific_data, ingested_at)
             VALUES (?, ?, ?, ?, ?, ?, true, ?, ?, ?, ?, ?)
             ON CONFLICT (chain_id, block_hash) DO UPDATE SET
                 finality_status = excluded.finality_status,
                 is_active = true,
                 gas_used = excluded.gas_used,
                 gas_limit = excluded.gas_limit,
                 transaction_count = excluded.transaction_count,
                 chain_specific_data = excluded.chain_specific_data",
            params![
                self.chain_id,
                block.number as i64,
                block.hash,
                block.parent_hash,
                block.timestamp as i64,
                block.finality.as_str(),
                block.gas_used.map(|v| v as i64),
                block.gas_limit.map(|v| v as i64),
                block.transaction_count as i64,
                json_bag(&block.chain_specific),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Upsert a transaction by `(chain_id, tx_hash)`. A re-ingested
    /// transaction overwrites mutable fields (status flips when
    /// finality is reached) and leaves identical rows unchanged.
    pub fn insert_transaction(&self, tx: &NormalizedTransaction) -> Result<(), StoreError> {
        let guard = lock(&self.conn)?;
        guard.execute(
            "INSERT INTO transactions
                 (chain_id, tx_hash, block_number, block_hash, block_timestamp,
                  from_address, to_address, value, gas_limit, gas_used, gas_price,
                  fee, status, input_data, chain_specific_data, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, CAST(? AS DECIMAL(38,0)), ?, ?,
                     CAST(? AS DECIMAL(38,0)), CAST(? AS DECIMAL(38,0)), ?, ?, ?, ?)
             ON CONFLICT (chain_id, tx_hash) DO UPDATE SET
                 block_number = excluded.block_number,
                 block_hash = excluded.block_hash,
                 block_timestamp = excluded.block_timestamp,
                 gas_used = excluded.gas_used,
                 gas_price = excluded.gas_price,
                 fee = excluded.fee,
                 status = excluded.status,
                 chain_specific_data = excluded.chain_specific_data,
                 updated_at = excluded.updated_at",
            params![
                self.chain_id,
                tx.tx_hash,
                tx.block_number as i64,
                tx.block_hash,
                tx.block_timestamp as i64,
                tx.from_address,
                tx.to_address,
                tx.value,
                tx.gas_limit.map(|v| v as i64),
                tx.gas_used.map(|v| v as i64),
                tx.gas_price,
                tx.fee,
                tx.status.as_str(),
                tx.input_data,
                json_bag(&tx.chain_specific),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Upsert a contract by `(chain_id, contract_address)`.
    ///
    /// Created once on first detection; deployment provenance is never
    /// clobbered afterwards. Re-verification only updates the
    /// verification fields.
    pub fn insert_contract(&self, contract: &NormalizedContract) -> Result<(), StoreError> {
        let guard = lock(&self.conn)?;
        guard.execute(
            "INSERT INTO contracts
                 (chain_id, contract_address, deployer_address, deployment_tx_hash,
                  deployment_block_number, class_hash, is_verified, first_seen_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (chain_id, contract_address) DO UPDATE SET
                 class_hash = COALESCE(excluded.class_hash, class_hash),
                 is_verified = excluded.is_verified",
            params![
                self.chain_id,
                contract.contract_address,
                contract.deployer_address,
                contract.deployment_tx_hash,
                contract.deployment_block_number as i64,
                contract.class_hash,
                contract.is_verified,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Ensure a wallet row exists and refresh its last activity without
    /// touching the transaction counter. Used for event-emitting
    /// contract addresses that never appear as a sender.
    pub fn touch_wallet(
        &self,
        wallet_address: &str,
        block_number: u64,
        block_timestamp: u64,
    ) -> Result<(), StoreError> {
        let guard = lock(&self.conn)?;
        guard.execute(
            "INSERT INTO wallets
                 (chain_id, wallet_address, first_seen_block, first_seen_at,
                  last_activity_at, total_transactions, wallet_type)
             VALUES (?, ?, ?, ?, ?, 0, 'contract')
             ON CONFLICT (chain_id, wallet_address) DO UPDATE SET
                 last_activity_at = GREATEST(last_activity_at, excluded.last_activity_at)",
            params![
                self.chain_id,
                wallet_address,
                block_number as i64,
                block_timestamp as i64,
                block_timestamp as i64,
            ],
        )?;
        Ok(())
    }

    /// Upsert a wallet's per-block activity.
    ///
    /// For counted (sender) updates the transaction counter is
    /// recomputed from the transactions table rather than incremented,
    /// so re-ingesting a block leaves it unchanged and a wallet sending
    /// several transactions in one block counts each of them. The
    /// block's transactions must already be stored when this runs. A
    /// wallet once classified as a contract never regresses to an EOA.
    pub fn insert_wallet_activity(&self, update: &WalletUpdate) -> Result<(), StoreError> {
        let guard = lock(&self.conn)?;
        guard.execute(
            "INSERT INTO wallets
                 (chain_id, wallet_address, first_seen_block, first_seen_at,
                  last_activity_at, total_transactions, wallet_type)
             VALUES (?, ?, ?, ?, ?, 0, ?)
             ON CONFLICT (chain_id, wallet_address) DO UPDATE SET
                 last_activity_at = GREATEST(last_activity_at, excluded.last_activity_at),
                 wallet_type = CASE
                     WHEN wallet_type = 'contract' THEN wallet_type
                     ELSE excluded.wallet_type
                 END",
            params![
                self.chain_id,
                update.wallet_address,
                update.block_number as i64,
                update.block_timestamp as i64,
                update.block_timestamp as i64,
                update.wallet_type.as_str(),
            ],
        )?;

        if update.counted {
            guard.execute(
                "UPDATE wallets SET total_transactions = (
                     SELECT COUNT(*) FROM transactions
                     WHERE chain_id = ? AND from_address = ?
                 )
                 WHERE chain_id = ? AND wallet_address = ?",
                params![
                    self.chain_id,
                    update.wallet_address,
                    self.chain_id,
                    update.wallet_address,
                ],
            )?;
        }
        Ok(())
    }

    /// Upsert a wallet/contract interaction by its natural key
    pub fn insert_wallet_interaction(
        &self,
        interaction: &WalletInteraction,
    ) -> Result<(), StoreError> {
        let guard = lock(&self.conn)?;
        guard.execute(
            "INSERT INTO wallet_interactions
                 (chain_id, tx_hash, wallet_address, contract_address,
                  interaction_type, value, gas_used, success, interaction_timestamp)
             VALUES (?, ?, ?, ?, ?, CAST(? AS DECIMAL(38,0)), ?, ?, ?)
             ON CONFLICT (chain_id, tx_hash, wallet_address, contract_address) DO UPDATE SET
                 interaction_type = excluded.interaction_type,
                 value = excluded.value,
                 gas_used = excluded.gas_used,
                 success = excluded.success,
                 interaction_timestamp = excluded.interaction_timestamp",
            params![
                self.chain_id,
                interaction.tx_hash,
                interaction.wallet_address,
                interaction.contract_address,
                interaction.interaction_type,
                interaction.value,
                interaction.gas_used.map(|v| v as i64),
                interaction.success,
                interaction.timestamp as i64,
            ],
        )?;
        Ok(())
    }

    /// Recompute the realtime aggregate for one contract from the
    /// wallet_interactions table — a full re-aggregation, not an
    /// incremental delta, so repeated invocation is idempotent.
    pub fn update_contract_metrics(&self, contract_address: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        let cutoff = now.timestamp() - 86_400;

        let guard = lock(&self.conn)?;
        let (total, unique_users, volume, last_24h): (i64, i64, String, i64) = guard.query_row(
            "SELECT COUNT(*),
                    COUNT(DISTINCT wallet_address),
                    CAST(COALESCE(SUM(value), 0) AS VARCHAR),
                    COUNT(*) FILTER (WHERE interaction_timestamp >= ?)
             FROM wallet_interactions
             WHERE chain_id = ? AND contract_address = ?",
            params![cutoff, self.chain_id, contract_address],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                ))
            },
        )?;

        guard.execute(
            "INSERT INTO contract_metrics_realtime
                 (chain_id, contract_address, total_transactions, unique_users,
                  total_volume, last_24h_transactions, computed_at)
             VALUES (?, ?, ?, ?, CAST(? AS DECIMAL(38,0)), ?, ?)
             ON CONFLICT (chain_id, contract_address) DO UPDATE SET
                 total_transactions = excluded.total_transactions,
                 unique_users = excluded.unique_users,
                 total_volume = excluded.total_volume,
                 last_24h_transactions = excluded.last_24h_transactions,
                 computed_at = excluded.computed_at",
            params![
                self.chain_id,
                contract_address,
                total,
                unique_users,
                volume,
                last_24h,
                now.to_rfc3339(),
            ],
        )?;

        debug!(
            "Recomputed metrics for {} on {}: {} interactions, {} users",
            contract_address, self.chain_id, total, unique_users
        );
        Ok(())
    }

    // ── Read helpers (orchestrator and tests) ──────────────────────

    /// The single active block at a height, if any
    pub fn active_block(&self, height: u64) -> Result<Option<BlockRow>, StoreError> {
        let guard = lock(&self.conn)?;
        let result = guard.query_row(
            "SELECT block_number, block_hash, parent_hash, block_timestamp,
                    finality_status, is_active, transaction_count
             FROM blocks
             WHERE chain_id = ? AND block_number = ? AND is_active",
            params![self.chain_id, height as i64],
            block_row,
        );
        optional(result)
    }

    /// All rows ever stored at a height (reorg history included)
    pub fn blocks_at_height(&self, height: u64) -> Result<Vec<BlockRow>, StoreError> {
        let guard = lock(&self.conn)?;
        let mut stmt = guard.prepare(
            "SELECT block_number, block_hash, parent_hash, block_timestamp,
                    finality_status, is_active, transaction_count
             FROM blocks
             WHERE chain_id = ? AND block_number = ?
             ORDER BY is_active DESC, block_hash",
        )?;
        let rows = stmt.query_map(params![self.chain_id, height as i64], block_row)?;
        let mut blocks = Vec::new();
        for row in rows {
            blocks.push(row?);
        }
        Ok(blocks)
    }

    pub fn transaction_count_in_block(&self, height: u64) -> Result<u64, StoreError> {
        self.count_query(
            "SELECT COUNT(*) FROM transactions WHERE chain_id = ? AND block_number = ?",
            Some(height),
        )
    }

    pub fn transaction_count(&self) -> Result<u64, StoreError> {
        self.count_query("SELECT COUNT(*) FROM transactions WHERE chain_id = ?", None)
    }

    pub fn contract_count(&self) -> Result<u64, StoreError> {
        self.count_query("SELECT COUNT(*) FROM contracts WHERE chain_id = ?", None)
    }

    pub fn wallet_count(&self) -> Result<u64, StoreError> {
        self.count_query("SELECT COUNT(*) FROM wallets WHERE chain_id = ?", None)
    }

    pub fn interaction_count(&self) -> Result<u64, StoreError> {
        self.count_query(
            "SELECT COUNT(*) FROM wallet_interactions WHERE chain_id = ?",
            None,
        )
    }

    /// Transactions whose parent block row is missing — must be zero
    /// after any successful block commit.
    pub fn orphan_transaction_count(&self) -> Result<u64, StoreError> {
        self.count_query(
            "SELECT COUNT(*) FROM transactions t
             WHERE t.chain_id = ?
               AND NOT EXISTS (
                   SELECT 1 FROM blocks b
                   WHERE b.chain_id = t.chain_id AND b.block_hash = t.block_hash
               )",
            None,
        )
    }

    pub fn get_transaction(&self, tx_hash: &str) -> Result<Option<TransactionRow>, StoreError> {
        let guard = lock(&self.conn)?;
        let result = guard.query_row(
            "SELECT tx_hash, block_number, block_hash, from_address, to_address,
                    CAST(value AS VARCHAR), status
             FROM transactions
             WHERE chain_id = ? AND tx_hash = ?",
            params![self.chain_id, tx_hash],
            |row| {
                Ok(TransactionRow {
                    tx_hash: row.get(0)?,
                    block_number: row.get::<_, i64>(1)? as u64,
                    block_hash: row.get(2)?,
                    from_address: row.get(3)?,
                    to_address: row.get(4)?,
                    value: row.get(5)?,
                    status: row.get(6)?,
                })
            },
        );
        optional(result)
    }

    pub fn get_wallet(&self, wallet_address: &str) -> Result<Option<WalletRow>, StoreError> {
        let guard = lock(&self.conn)?;
        let result = guard.query_row(
            "SELECT wallet_address, first_seen_block, last_activity_at,
                    total_transactions, wallet_type
             FROM wallets
             WHERE chain_id = ? AND wallet_address = ?",
            params![self.chain_id, wallet_address],
            |row| {
                Ok(WalletRow {
                    wallet_address: row.get(0)?,
                    first_seen_block: row.get::<_, i64>(1)? as u64,
                    last_activity_at: row.get::<_, i64>(2)? as u64,
                    total_transactions: row.get::<_, i64>(3)? as u64,
                    wallet_type: row.get(4)?,
                })
            },
        );
        optional(result)
    }

    pub fn get_contract(&self, contract_address: &str) -> Result<Option<ContractRow>, StoreError> {
        let guard = lock(&self.conn)?;
        let result = guard.query_row(
            "SELECT contract_address, deployer_address, deployment_tx_hash,
                    deployment_block_number, class_hash, is_verified
             FROM contracts
             WHERE chain_id = ? AND contract_address = ?",
            params![self.chain_id, contract_address],
            |row| {
                Ok(ContractRow {
                    contract_address: row.get(0)?,
                    deployer_address: row.get(1)?,
                    deployment_tx_hash: row.get(2)?,
                    deployment_block_number: row.get::<_, i64>(3)? as u64,
                    class_hash: row.get(4)?,
                    is_verified: row.get(5)?,
                })
            },
        );
        optional(result)
    }

    pub fn get_contract_metrics(
        &self,
        contract_address: &str,
    ) -> Result<Option<ContractMetricsRow>, StoreError> {
        let guard = lock(&self.conn)?;
        let result = guard.query_row(
            "SELECT total_transactions, unique_users,
                    CAST(total_volume AS VARCHAR), last_24h_transactions
             FROM contract_metrics_realtime
             WHERE chain_id = ? AND contract_address = ?",
            params![self.chain_id, contract_address],
            |row| {
                Ok(ContractMetricsRow {
                    total_transactions: row.get::<_, i64>(0)? as u64,
                    unique_users: row.get::<_, i64>(1)? as u64,
                    total_volume: row.get(2)?,
                    last_24h_transactions: row.get::<_, i64>(3)? as u64,
                })
            },
        );
        optional(result)
    }

    fn count_query(&self, sql: &str, height: Option<u64>) -> Result<u64, StoreError> {
        let guard = lock(&self.conn)?;
        let count: i64 = match height {
            Some(h) => guard.query_row(sql, params![self.chain_id, h as i64], |row| row.get(0))?,
            None => guard.query_row(sql, params![self.chain_id], |row| row.get(0))?,
        };
        Ok(count as u64)
    }
}

fn block_row(row: &duckdb::Row<'_>) -> Result<BlockRow, duckdb::Error> {
    let finality_raw: String = row.get(4)?;
    Ok(BlockRow {
        block_number: row.get::<_, i64>(0)? as u64,
        block_hash: row.get(1)?,
        parent_hash: row.get(2)?,
        block_timestamp: row.get::<_, i64>(3)? as u64,
        finality: FinalityStatus::parse(&finality_raw).unwrap_or(FinalityStatus::Pending),
        is_active: row.get(5)?,
        transaction_count: row.get::<_, i32>(6)? as u32,
    })
}

fn optional<T>(result: Result<T, duckdb::Error>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Serialize the chain-specific bag, mapping JSON null to SQL NULL
fn json_bag(value: &Value) -> Option<String> {
    if value.is_null() {
        None
    } else {
        Some(value.to_string())
    }
}
