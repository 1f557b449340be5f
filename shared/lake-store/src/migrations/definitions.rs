//! Migration definitions and traits

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version number for migrations (monotonically increasing)
pub type MigrationVersion = u32;

/// A single migration operation
pub trait Migration: Send + Sync {
    /// Unique version number (1, 2, 3...)
    fn version(&self) -> MigrationVersion;

    /// Human-readable name (e.g. "unified_schema")
    fn name(&self) -> &'static str;

    /// SQL to apply this migration. Statements are split on semicolons
    /// and must be idempotent (IF NOT EXISTS) so a partial-failure
    /// restart can re-run them safely.
    fn up(&self) -> &'static str;

    /// SQL to reverse this migration
    fn down(&self) -> &'static str;
}

/// Record of an applied migration from `schema_migrations`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub version: MigrationVersion,
    pub name: String,
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    pub execution_time_ms: i64,
    pub rolled_back_at: Option<DateTime<Utc>>,
}

/// Direction of migration execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    Up,
    Down,
}

/// Result of running migrations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MigrationResult {
    pub migrations_applied: Vec<AppliedMigration>,
    pub migrations_rolled_back: Vec<AppliedMigration>,
    pub current_version: Option<MigrationVersion>,
    pub total_time_ms: u64,
}

impl MigrationResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations_applied.is_empty() && self.migrations_rolled_back.is_empty()
    }
}

/// Configuration for the migration runner
#[derive(Debug, Clone, Default)]
pub struct MigrationConfig {
    /// Log what would run without executing DDL
    pub dry_run: bool,
    /// Target version (None = latest)
    pub target_version: Option<MigrationVersion>,
}

impl MigrationConfig {
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_target_version(mut self, version: MigrationVersion) -> Self {
        self.target_version = Some(version);
        self
    }
}
