//! V002: secondary indexes for the ingestion read paths
//!
//! Height lookups (reorg deactivation, active-block queries) and the
//! per-contract metric recomputation scan these constantly.

use super::definitions::{Migration, MigrationVersion};

/// V002: add ingestion indexes
pub struct V002IngestionIndexes;

impl Migration for V002IngestionIndexes {
    fn version(&self) -> MigrationVersion {
        2
    }

    fn name(&self) -> &'static str {
        "ingestion_indexes"
    }

    fn up(&self) -> &'static str {
        V002_UP_SQL
    }

    fn down(&self) -> &'static str {
        V002_DOWN_SQL
    }
}

const V002_UP_SQL: &str = "
CREATE INDEX IF NOT EXISTS idx_blocks_height ON blocks (chain_id, block_number);
CREATE INDEX IF NOT EXISTS idx_transactions_block ON transactions (chain_id, block_number);
CREATE INDEX IF NOT EXISTS idx_transactions_from ON transactions (chain_id, from_address);
CREATE INDEX IF NOT EXISTS idx_interactions_contract ON wallet_interactions (chain_id, contract_address);
CREATE INDEX IF NOT EXISTS idx_interactions_wallet ON wallet_interactions (chain_id, wallet_address)";

const V002_DOWN_SQL: &str = "
DROP INDEX IF EXISTS idx_interactions_wallet;
DROP INDEX IF EXISTS idx_interactions_contract;
DROP INDEX IF EXISTS idx_transactions_from;
DROP INDEX IF EXISTS idx_transactions_block;
DROP INDEX IF EXISTS idx_blocks_height";
