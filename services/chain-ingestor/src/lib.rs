//! Multi-chain ingestion service
//!
//! One orchestrator per configured chain walks the chain through the
//! per-block pipeline and keeps the unified store current, re-ingesting
//! a reorg-safety window every live-sync cycle so the idempotent
//! upserts self-correct forks near the tip.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod processors;

pub use config::{ChainConfig, IngestorConfig};
pub use error::{IngestError, PipelineStage};
pub use pipeline::ChainOrchestrator;
pub use processors::ProcessorSet;
