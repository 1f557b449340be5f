//! V001: unified cross-chain schema
//!
//! Every table is chain-scoped via `chain_id` plus a natural key, so one
//! schema serves arbitrarily many chains. Blocks key on the hash, not
//! the height: reorganized blocks are retained with `is_active = false`,
//! so a height can hold several rows over time.

use super::definitions::{Migration, MigrationVersion};

/// V001: create the unified ingestion tables
pub struct V001UnifiedSchema;

impl Migration for V001UnifiedSchema {
    fn version(&self) -> MigrationVersion {
        1
    }

    fn name(&self) -> &'static str {
        "unified_schema"
    }

    fn up(&self) -> &'static str {
        V001_UP_SQL
    }

    fn down(&self) -> &'static str {
        V001_DOWN_SQL
    }
}

const V001_UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS blocks (
    chain_id          VARCHAR NOT NULL,
    block_number      BIGINT NOT NULL,
    block_hash        VARCHAR NOT NULL,
    parent_hash       VARCHAR,
    block_timestamp   BIGINT NOT NULL,
    finality_status   VARCHAR NOT NULL,
    is_active         BOOLEAN NOT NULL DEFAULT true,
    gas_used          BIGINT,
    gas_limit         BIGINT,
    transaction_count INTEGER NOT NULL DEFAULT 0,
    chain_specific_data VARCHAR,
    ingested_at       VARCHAR NOT NULL,
    PRIMARY KEY (chain_id, block_hash)
);

CREATE TABLE IF NOT EXISTS transactions (
    chain_id          VARCHAR NOT NULL,
    tx_hash           VARCHAR NOT NULL,
    block_number      BIGINT NOT NULL,
    block_hash        VARCHAR NOT NULL,
    block_timestamp   BIGINT NOT NULL,
    from_address      VARCHAR NOT NULL,
    to_address        VARCHAR,
    value             DECIMAL(38,0) NOT NULL,
    gas_limit         BIGINT,
    gas_used          BIGINT,
    gas_price         DECIMAL(38,0),
    fee               DECIMAL(38,0),
    status            VARCHAR NOT NULL,
    input_data        VARCHAR,
    chain_specific_data VARCHAR,
    updated_at        VARCHAR NOT NULL,
    PRIMARY KEY (chain_id, tx_hash)
);

CREATE TABLE IF NOT EXISTS contracts (
    chain_id                VARCHAR NOT NULL,
    contract_address        VARCHAR NOT NULL,
    deployer_address        VARCHAR NOT NULL,
    deployment_tx_hash      VARCHAR NOT NULL,
    deployment_block_number BIGINT NOT NULL,
    class_hash              VARCHAR,
    is_verified             BOOLEAN NOT NULL DEFAULT false,
    first_seen_at           VARCHAR NOT NULL,
    PRIMARY KEY (chain_id, contract_address)
);

CREATE TABLE IF NOT EXISTS wallets (
    chain_id           VARCHAR NOT NULL,
    wallet_address     VARCHAR NOT NULL,
    first_seen_block   BIGINT NOT NULL,
    first_seen_at      BIGINT NOT NULL,
    last_activity_at   BIGINT NOT NULL,
    total_transactions BIGINT NOT NULL DEFAULT 0,
    wallet_type        VARCHAR NOT NULL,
    PRIMARY KEY (chain_id, wallet_address)
);

CREATE TABLE IF NOT EXISTS wallet_interactions (
    chain_id              VARCHAR NOT NULL,
    tx_hash               VARCHAR NOT NULL,
    wallet_address        VARCHAR NOT NULL,
    contract_address      VARCHAR NOT NULL,
    interaction_type      VARCHAR NOT NULL,
    value                 DECIMAL(38,0) NOT NULL,
    gas_used              BIGINT,
    success               BOOLEAN NOT NULL,
    interaction_timestamp BIGINT NOT NULL,
    PRIMARY KEY (chain_id, tx_hash, wallet_address, contract_address)
);

CREATE TABLE IF NOT EXISTS contract_metrics_realtime (
    chain_id              VARCHAR NOT NULL,
    contract_address      VARCHAR NOT NULL,
    total_transactions    BIGINT NOT NULL DEFAULT 0,
    unique_users          BIGINT NOT NULL DEFAULT 0,
    total_volume          DECIMAL(38,0) NOT NULL DEFAULT 0,
    last_24h_transactions BIGINT NOT NULL DEFAULT 0,
    computed_at           VARCHAR NOT NULL,
    PRIMARY KEY (chain_id, contract_address)
);

CREATE TABLE IF NOT EXISTS sync_state (
    chain_id             VARCHAR NOT NULL,
    last_synced_block    BIGINT NOT NULL DEFAULT 0,
    last_finalized_block BIGINT NOT NULL DEFAULT 0,
    updated_at           VARCHAR NOT NULL,
    PRIMARY KEY (chain_id)
)";

const V001_DOWN_SQL: &str = "
DROP TABLE IF EXISTS sync_state;
DROP TABLE IF EXISTS contract_metrics_realtime;
DROP TABLE IF EXISTS wallet_interactions;
DROP TABLE IF EXISTS wallets;
DROP TABLE IF EXISTS contracts;
DROP TABLE IF EXISTS transactions;
DROP TABLE IF EXISTS blocks";
