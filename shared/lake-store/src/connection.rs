//! DuckDB connection management
//!
//! Opens the database and applies memory/thread settings. The
//! connection is wrapped in a mutex and shared between the adapter, the
//! sync state manager and the migration registry: DuckDB handles one
//! writer per database, and the pipeline serializes writes per block
//! anyway.

use std::sync::{Arc, Mutex, MutexGuard};

use duckdb::Connection;
use tracing::info;

use crate::config::StoreConfig;
use crate::error::StoreError;

/// Shared handle to one DuckDB database
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Open the database described by the config and apply settings
pub fn open_connection(config: &StoreConfig) -> Result<SharedConnection, StoreError> {
    config.validate()?;

    let conn = if config.db_path == ":memory:" {
        Connection::open_in_memory()
            .map_err(|e| StoreError::Connection(format!("Failed to open in-memory db: {}", e)))?
    } else {
        Connection::open(&config.db_path).map_err(|e| {
            StoreError::Connection(format!("Failed to open '{}': {}", config.db_path, e))
        })?
    };

    conn.execute_batch(&format!(
        "SET memory_limit = '{}MB';
         SET threads = {};",
        config.memory_limit_mb, config.threads
    ))
    .map_err(|e| StoreError::Config(format!("Failed to configure DuckDB: {}", e)))?;

    info!(
        "Opened unified store at '{}' (memory={}MB, threads={})",
        config.db_path, config.memory_limit_mb, config.threads
    );

    Ok(Arc::new(Mutex::new(conn)))
}

/// Lock the shared connection, mapping a poisoned mutex to a store
/// error instead of panicking in library code.
pub(crate) fn lock(conn: &SharedConnection) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock()
        .map_err(|_| StoreError::Connection("Connection mutex poisoned".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let conn = open_connection(&StoreConfig::in_memory()).unwrap();
        let guard = lock(&conn).unwrap();
        let answer: i64 = guard
            .query_row("SELECT 41 + 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(answer, 42);
    }
}
