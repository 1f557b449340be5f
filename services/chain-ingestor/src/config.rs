//! Service configuration
//!
//! Loaded from a JSON file (path in `CHAINLAKE_CONFIG`) with per-field
//! defaults and a few environment overrides. One `ChainConfig` per
//! chain carries the RPC endpoints plus the sync knobs; the defaults
//! match mainnet-safe values and only need overriding for unusual
//! chains.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use chain_common::ChainFamily;
use rpc_client::RpcClientConfig;

use crate::error::IngestError;

const CONFIG_PATH_ENV: &str = "CHAINLAKE_CONFIG";
const DB_PATH_ENV: &str = "CHAINLAKE_DB_PATH";
const DEFAULT_CONFIG_PATH: &str = "config/chainlake.json";

/// Per-chain ingestion settings
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Stable identifier, e.g. "eth-mainnet"
    pub chain_id: String,

    pub family: ChainFamily,

    /// Ordered RPC endpoint candidates
    pub endpoints: Vec<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_endpoint: u32,

    #[serde(default = "default_base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,

    /// Cap on concurrent per-transaction detail fetches within a block
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Blocks behind the cursor re-ingested every live-sync cycle
    #[serde(default = "default_reorg_depth")]
    pub reorg_depth: u64,

    /// Depth at which a block is considered final
    #[serde(default = "default_finality_depth")]
    pub finality_depth: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    10
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_retry_delay_ms() -> u64 {
    200
}
fn default_max_concurrent_fetches() -> usize {
    8
}
fn default_reorg_depth() -> u64 {
    10
}
fn default_finality_depth() -> u64 {
    64
}
fn default_poll_interval_secs() -> u64 {
    10
}
fn default_error_backoff_secs() -> u64 {
    30
}

impl ChainConfig {
    pub fn rpc_config(&self) -> RpcClientConfig {
        RpcClientConfig {
            endpoints: self.endpoints.clone(),
            max_attempts: self.max_attempts_per_endpoint,
            base_delay: Duration::from_millis(self.base_retry_delay_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    fn validate(&self) -> Result<(), IngestError> {
        if self.chain_id.trim().is_empty() {
            return Err(IngestError::Config("chain_id must not be empty".into()));
        }
        if self.endpoints.is_empty() {
            return Err(IngestError::Config(format!(
                "Chain '{}' has no endpoints",
                self.chain_id
            )));
        }
        if self.max_concurrent_fetches == 0 {
            return Err(IngestError::Config(format!(
                "Chain '{}': max_concurrent_fetches must be at least 1",
                self.chain_id
            )));
        }
        Ok(())
    }
}

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestorConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Identifier for this process in logs; generated when absent
    #[serde(default = "generate_instance_id")]
    pub instance_id: String,

    pub chains: Vec<ChainConfig>,
}

fn default_db_path() -> String {
    "chainlake.duckdb".to_string()
}

fn generate_instance_id() -> String {
    Uuid::new_v4().to_string()
}

impl IngestorConfig {
    /// Load from the file named by `CHAINLAKE_CONFIG` (or the default
    /// path), then apply environment overrides.
    pub fn load() -> Result<Self, IngestError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(&path)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        let mut config: IngestorConfig = serde_json::from_str(&raw).map_err(|e| {
            IngestError::Config(format!("Cannot parse config '{}': {}", path.display(), e))
        })?;

        if let Ok(db_path) = std::env::var(DB_PATH_ENV) {
            config.db_path = db_path;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), IngestError> {
        if self.chains.is_empty() {
            return Err(IngestError::Config(
                "At least one chain must be configured".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for chain in &self.chains {
            chain.validate()?;
            if !seen.insert(chain.chain_id.as_str()) {
                return Err(IngestError::Config(format!(
                    "Duplicate chain_id '{}'",
                    chain.chain_id
                )));
            }
        }
        Ok(())
    }
}
