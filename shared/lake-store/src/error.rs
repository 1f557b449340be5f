//! Error types for the unified store

use thiserror::Error;

/// Store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(String),

    /// Migration execution error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Applied migration SQL no longer matches its recorded checksum
    #[error("Schema drift: {0}")]
    SchemaDrift(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<duckdb::Error> for StoreError {
    fn from(err: duckdb::Error) -> Self {
        StoreError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
