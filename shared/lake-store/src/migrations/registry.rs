//! Migration registry
//!
//! Tracks applied migrations in a `schema_migrations` table in the same
//! database the DDL targets, recording versions, checksums and timing.
//! There is exactly one writer per database, so no cross-process lock
//! is taken.

use chrono::{DateTime, Utc};
use duckdb::params;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::definitions::{AppliedMigration, MigrationConfig, MigrationVersion};
use crate::connection::{lock, SharedConnection};
use crate::error::StoreError;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS schema_migrations (
    version           INTEGER PRIMARY KEY,
    name              VARCHAR NOT NULL,
    checksum          VARCHAR NOT NULL,
    applied_at        VARCHAR NOT NULL,
    execution_time_ms BIGINT NOT NULL,
    rolled_back_at    VARCHAR,
    up_sql            VARCHAR NOT NULL,
    down_sql          VARCHAR NOT NULL
)";

/// Compute the sha256 checksum of a migration's SQL
pub fn compute_checksum(sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql.as_bytes());
    hex::encode(hasher.finalize())
}

/// Registry of applied migrations
pub struct MigrationRegistry {
    conn: SharedConnection,
    config: MigrationConfig,
}

impl MigrationRegistry {
    /// Open the registry, creating the tracking table if needed
    pub fn open(conn: SharedConnection, config: MigrationConfig) -> Result<Self, StoreError> {
        {
            let guard = lock(&conn)?;
            guard
                .execute_batch(CREATE_MIGRATIONS_TABLE)
                .map_err(|e| {
                    StoreError::Migration(format!("Failed to create schema_migrations: {}", e))
                })?;
        }
        debug!("Migration tracking table ready");
        Ok(Self { conn, config })
    }

    pub fn is_dry_run(&self) -> bool {
        self.config.dry_run
    }

    pub fn target_version(&self) -> Option<MigrationVersion> {
        self.config.target_version
    }

    /// All applied migrations (not rolled back), oldest first
    pub fn applied_migrations(&self) -> Result<Vec<AppliedMigration>, StoreError> {
        let guard = lock(&self.conn)?;
        let mut stmt = guard.prepare(
            "SELECT version, name, checksum, applied_at, execution_time_ms, rolled_back_at
             FROM schema_migrations
             WHERE rolled_back_at IS NULL
             ORDER BY version ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut migrations = Vec::new();
        for row in rows {
            let (version, name, checksum, applied_at, execution_time_ms, rolled_back_at) = row?;
            migrations.push(AppliedMigration {
                version: version as MigrationVersion,
                name,
                checksum,
                applied_at: parse_timestamp(&applied_at)?,
                execution_time_ms,
                rolled_back_at: rolled_back_at.as_deref().map(parse_timestamp).transpose()?,
            });
        }
        Ok(migrations)
    }

    /// Highest applied (not rolled back) version
    pub fn current_version(&self) -> Result<Option<MigrationVersion>, StoreError> {
        let guard = lock(&self.conn)?;
        let max: Option<i64> = guard.query_row(
            "SELECT MAX(version) FROM schema_migrations WHERE rolled_back_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(max.map(|v| v as MigrationVersion))
    }

    /// Record a migration as applied. Upserts so a version applied,
    /// rolled back, and applied again keeps one row.
    pub fn record_migration(
        &self,
        version: MigrationVersion,
        name: &str,
        up_sql: &str,
        down_sql: &str,
        execution_time_ms: i64,
    ) -> Result<AppliedMigration, StoreError> {
        let now = Utc::now();
        let checksum = compute_checksum(up_sql);

        let guard = lock(&self.conn)?;
        guard.execute(
            "INSERT INTO schema_migrations
                 (version, name, checksum, applied_at, execution_time_ms,
                  rolled_back_at, up_sql, down_sql)
             VALUES (?, ?, ?, ?, ?, NULL, ?, ?)
             ON CONFLICT (version) DO UPDATE SET
                 name = excluded.name,
                 checksum = excluded.checksum,
                 applied_at = excluded.applied_at,
                 execution_time_ms = excluded.execution_time_ms,
                 rolled_back_at = NULL,
                 up_sql = excluded.up_sql,
                 down_sql = excluded.down_sql",
            params![
                version as i64,
                name,
                checksum,
                now.to_rfc3339(),
                execution_time_ms,
                up_sql,
                down_sql
            ],
        )?;

        Ok(AppliedMigration {
            version,
            name: name.to_string(),
            checksum,
            applied_at: now,
            execution_time_ms,
            rolled_back_at: None,
        })
    }

    /// Mark a migration as rolled back
    pub fn record_rollback(&self, version: MigrationVersion) -> Result<(), StoreError> {
        let guard = lock(&self.conn)?;
        let updated = guard.execute(
            "UPDATE schema_migrations SET rolled_back_at = ? WHERE version = ?",
            params![Utc::now().to_rfc3339(), version as i64],
        )?;
        if updated == 0 {
            return Err(StoreError::Migration(format!(
                "Cannot roll back unknown migration v{}",
                version
            )));
        }
        Ok(())
    }

    /// Stored down SQL for a version
    pub fn down_sql(&self, version: MigrationVersion) -> Result<String, StoreError> {
        let guard = lock(&self.conn)?;
        let result = guard.query_row(
            "SELECT down_sql FROM schema_migrations WHERE version = ?",
            params![version as i64],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(sql) => Ok(sql),
            Err(duckdb::Error::QueryReturnedNoRows) => Err(StoreError::Migration(format!(
                "No recorded down SQL for migration v{}",
                version
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the stored checksum for an applied version matches the
    /// given SQL. Returns true when the version was never applied.
    pub fn verify_checksum(
        &self,
        version: MigrationVersion,
        up_sql: &str,
    ) -> Result<bool, StoreError> {
        let guard = lock(&self.conn)?;
        let result = guard.query_row(
            "SELECT checksum FROM schema_migrations
             WHERE version = ? AND rolled_back_at IS NULL",
            params![version as i64],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(stored) => Ok(stored == compute_checksum(up_sql)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("Bad timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::connection::open_connection;

    fn registry() -> MigrationRegistry {
        let conn = open_connection(&StoreConfig::in_memory()).unwrap();
        MigrationRegistry::open(conn, MigrationConfig::default()).unwrap()
    }

    #[test]
    fn test_checksum_is_stable() {
        let a = compute_checksum("CREATE TABLE t (x INTEGER)");
        let b = compute_checksum("CREATE TABLE t (x INTEGER)");
        let c = compute_checksum("CREATE TABLE t (y INTEGER)");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_record_and_query() {
        let registry = registry();
        assert_eq!(registry.current_version().unwrap(), None);

        registry
            .record_migration(1, "first", "CREATE TABLE a (x INTEGER)", "DROP TABLE a", 5)
            .unwrap();
        registry
            .record_migration(2, "second", "CREATE TABLE b (x INTEGER)", "DROP TABLE b", 3)
            .unwrap();

        assert_eq!(registry.current_version().unwrap(), Some(2));
        let applied = registry.applied_migrations().unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].name, "first");
    }

    #[test]
    fn test_rollback_and_reapply() {
        let registry = registry();
        registry
            .record_migration(1, "first", "CREATE TABLE a (x INTEGER)", "DROP TABLE a", 5)
            .unwrap();
        registry.record_rollback(1).unwrap();
        assert_eq!(registry.current_version().unwrap(), None);

        // Re-applying after rollback keeps a single row
        registry
            .record_migration(1, "first", "CREATE TABLE a (x INTEGER)", "DROP TABLE a", 4)
            .unwrap();
        assert_eq!(registry.current_version().unwrap(), Some(1));
    }

    #[test]
    fn test_rollback_unknown_version_fails() {
        let registry = registry();
        assert!(registry.record_rollback(9).is_err());
    }

    #[test]
    fn test_verify_checksum() {
        let registry = registry();
        registry
            .record_migration(1, "first", "CREATE TABLE a (x INTEGER)", "DROP TABLE a", 5)
            .unwrap();

        assert!(registry.verify_checksum(1, "CREATE TABLE a (x INTEGER)").unwrap());
        assert!(!registry.verify_checksum(1, "CREATE TABLE a (y INTEGER)").unwrap());
        // Unknown version passes (nothing to drift from)
        assert!(registry.verify_checksum(2, "whatever").unwrap());
    }
}
