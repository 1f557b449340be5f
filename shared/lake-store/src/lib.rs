//! Embedded analytical store for cross-chain ingestion.
//!
//! Backed by DuckDB with a unified schema shared by every chain family:
//! blocks keep their full reorg history (one active row per height),
//! all other entities upsert on their natural keys so ingestion is
//! idempotent end to end. Schema changes ship as versioned migrations
//! with checksummed, reversible SQL.

pub mod config;
pub mod connection;
pub mod error;
pub mod migrations;
pub mod store;
pub mod sync_state;

pub use config::StoreConfig;
pub use connection::{open_connection, SharedConnection};
pub use error::StoreError;
pub use migrations::{all_migrations, MigrationConfig, MigrationRunner, MigrationStatus};
pub use store::{
    BlockRow, ContractMetricsRow, ContractRow, TransactionRow, UnifiedStore, WalletRow,
};
pub use sync_state::{SyncState, SyncStateManager};
