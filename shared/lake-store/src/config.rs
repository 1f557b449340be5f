//! Store configuration
//!
//! Loaded from environment variables with per-field defaults, so a bare
//! process comes up against an in-memory database and a deployment sets
//! only what it overrides.

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Unified store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database path; ":memory:" for an in-process ephemeral database
    pub db_path: String,

    /// Memory limit in MB for the DuckDB instance
    pub memory_limit_mb: usize,

    /// Number of threads for the DuckDB instance
    pub threads: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            memory_limit_mb: 512,
            threads: 4,
        }
    }
}

impl StoreConfig {
    /// Load from environment variables:
    /// - `CHAINLAKE_DB_PATH`
    /// - `CHAINLAKE_DB_MEMORY_LIMIT_MB`
    /// - `CHAINLAKE_DB_THREADS`
    pub fn from_env() -> Result<Self, StoreError> {
        let defaults = Self::default();
        let config = Self {
            db_path: env::var("CHAINLAKE_DB_PATH").unwrap_or(defaults.db_path),
            memory_limit_mb: env::var("CHAINLAKE_DB_MEMORY_LIMIT_MB")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.memory_limit_mb),
            threads: env::var("CHAINLAKE_DB_THREADS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.threads),
        };
        config.validate()?;
        Ok(config)
    }

    /// In-memory configuration for tests and dry runs
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.db_path.is_empty() {
            return Err(StoreError::Config("db_path must not be empty".to_string()));
        }
        if self.threads == 0 {
            return Err(StoreError::Config("threads must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = StoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.db_path, ":memory:");
    }

    #[test]
    fn test_empty_path_rejected() {
        let config = StoreConfig {
            db_path: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
