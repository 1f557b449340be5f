//! Migration runner
//!
//! Applies pending migrations in version order, verifies checksums of
//! already-applied versions, and supports rollback to a target version
//! and dry-run mode.

use std::time::Instant;

use duckdb::Connection;
use tracing::{debug, info, warn};

use super::definitions::{
    AppliedMigration, Migration, MigrationConfig, MigrationDirection, MigrationResult,
    MigrationVersion,
};
use super::registry::{compute_checksum, MigrationRegistry};
use crate::connection::{lock, SharedConnection};
use crate::error::StoreError;

/// Migration runner that executes DDL and tracks state
pub struct MigrationRunner {
    conn: SharedConnection,
    config: MigrationConfig,
}

impl MigrationRunner {
    pub fn new(conn: SharedConnection) -> Self {
        Self {
            conn,
            config: MigrationConfig::default(),
        }
    }

    pub fn with_config(conn: SharedConnection, config: MigrationConfig) -> Self {
        Self { conn, config }
    }

    /// Run migrations up (or down) to the target version
    pub fn run(&self, migrations: &[Box<dyn Migration>]) -> Result<MigrationResult, StoreError> {
        let start_time = Instant::now();
        let mut result = MigrationResult::default();

        let registry = MigrationRegistry::open(self.conn.clone(), self.config.clone())?;

        let mut sorted: Vec<&Box<dyn Migration>> = migrations.iter().collect();
        sorted.sort_by_key(|m| m.version());

        let current_version = registry.current_version()?.unwrap_or(0);
        let target_version = registry
            .target_version()
            .unwrap_or_else(|| sorted.last().map(|m| m.version()).unwrap_or(0));

        info!(
            "Migration status: current={}, target={}",
            current_version, target_version
        );

        let direction = if target_version >= current_version {
            MigrationDirection::Up
        } else {
            MigrationDirection::Down
        };

        match direction {
            MigrationDirection::Up => {
                self.apply_migrations(&registry, &sorted, current_version, target_version, &mut result)?;
            }
            MigrationDirection::Down => {
                self.rollback_migrations(&registry, target_version, &mut result)?;
            }
        }

        result.total_time_ms = start_time.elapsed().as_millis() as u64;
        result.current_version = registry.current_version()?;
        Ok(result)
    }

    fn apply_migrations(
        &self,
        registry: &MigrationRegistry,
        migrations: &[&Box<dyn Migration>],
        current_version: MigrationVersion,
        target_version: MigrationVersion,
        result: &mut MigrationResult,
    ) -> Result<(), StoreError> {
        // Drift check before any new DDL runs
        for migration in migrations.iter().filter(|m| m.version() <= current_version) {
            if !registry.verify_checksum(migration.version(), migration.up())? {
                return Err(StoreError::SchemaDrift(format!(
                    "Checksum mismatch for migration v{} '{}'",
                    migration.version(),
                    migration.name()
                )));
            }
        }

        let pending: Vec<_> = migrations
            .iter()
            .filter(|m| m.version() > current_version && m.version() <= target_version)
            .collect();

        if pending.is_empty() {
            info!("No pending migrations to apply");
            return Ok(());
        }

        info!("Applying {} migrations", pending.len());
        for migration in pending {
            let applied = self.apply_single(registry, (**migration).as_ref())?;
            result.migrations_applied.push(applied);
        }
        Ok(())
    }

    fn apply_single(
        &self,
        registry: &MigrationRegistry,
        migration: &dyn Migration,
    ) -> Result<AppliedMigration, StoreError> {
        let version = migration.version();
        let name = migration.name();
        let up_sql = migration.up();

        info!("Applying migration v{}: {}", version, name);
        debug!("Migration SQL:\n{}", up_sql);

        if registry.is_dry_run() {
            info!("[DRY RUN] Would apply migration v{}: {}", version, name);
            return Ok(AppliedMigration {
                version,
                name: name.to_string(),
                checksum: compute_checksum(up_sql),
                applied_at: chrono::Utc::now(),
                execution_time_ms: 0,
                rolled_back_at: None,
            });
        }

        let start_time = Instant::now();
        {
            let guard = lock(&self.conn)?;
            execute_statements(&guard, up_sql).map_err(|e| {
                StoreError::Migration(format!("Migration v{} '{}' failed: {}", version, name, e))
            })?;
        }
        let execution_time_ms = start_time.elapsed().as_millis() as i64;

        let applied =
            registry.record_migration(version, name, up_sql, migration.down(), execution_time_ms)?;

        info!(
            "Applied migration v{}: {} in {} ms",
            version, name, execution_time_ms
        );
        Ok(applied)
    }

    fn rollback_migrations(
        &self,
        registry: &MigrationRegistry,
        target_version: MigrationVersion,
        result: &mut MigrationResult,
    ) -> Result<(), StoreError> {
        let applied = registry.applied_migrations()?;
        let to_rollback: Vec<_> = applied
            .iter()
            .filter(|m| m.version > target_version)
            .rev()
            .collect();

        if to_rollback.is_empty() {
            info!("No migrations to roll back");
            return Ok(());
        }

        info!("Rolling back {} migrations", to_rollback.len());
        for migration in to_rollback {
            self.rollback_single(registry, migration)?;
            let mut rolled_back = migration.clone();
            rolled_back.rolled_back_at = Some(chrono::Utc::now());
            result.migrations_rolled_back.push(rolled_back);
        }
        Ok(())
    }

    fn rollback_single(
        &self,
        registry: &MigrationRegistry,
        migration: &AppliedMigration,
    ) -> Result<(), StoreError> {
        let version = migration.version;
        info!("Rolling back migration v{}: {}", version, migration.name);

        if registry.is_dry_run() {
            info!("[DRY RUN] Would roll back migration v{}", version);
            return Ok(());
        }

        let down_sql = registry.down_sql(version)?;
        debug!("Rollback SQL:\n{}", down_sql);

        {
            let guard = lock(&self.conn)?;
            execute_statements(&guard, &down_sql).map_err(|e| {
                StoreError::Migration(format!("Rollback of v{} failed: {}", version, e))
            })?;
        }

        registry.record_rollback(version)?;
        info!("Rolled back migration v{}", version);
        Ok(())
    }

    /// Current migration status
    pub fn status(&self) -> Result<MigrationStatus, StoreError> {
        let registry = MigrationRegistry::open(self.conn.clone(), self.config.clone())?;
        Ok(MigrationStatus {
            current_version: registry.current_version()?,
            applied_migrations: registry.applied_migrations()?,
        })
    }

    /// Verify all checksums without applying anything
    pub fn verify_checksums(
        &self,
        migrations: &[Box<dyn Migration>],
    ) -> Result<Vec<(MigrationVersion, bool)>, StoreError> {
        let registry = MigrationRegistry::open(self.conn.clone(), self.config.clone())?;
        let mut results = Vec::new();
        for migration in migrations {
            let is_valid = registry.verify_checksum(migration.version(), migration.up())?;
            if !is_valid {
                warn!(
                    "Checksum mismatch for migration v{}: {}",
                    migration.version(),
                    migration.name()
                );
            }
            results.push((migration.version(), is_valid));
        }
        Ok(results)
    }
}

/// Status of migrations
#[derive(Debug)]
pub struct MigrationStatus {
    pub current_version: Option<MigrationVersion>,
    pub applied_migrations: Vec<AppliedMigration>,
}

fn execute_statements(conn: &Connection, sql: &str) -> Result<(), duckdb::Error> {
    for statement in sql.split(';').filter(|s| !s.trim().is_empty()) {
        conn.execute_batch(statement.trim())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::connection::open_connection;

    struct TestMigration {
        version: MigrationVersion,
        name: &'static str,
        up: &'static str,
        down: &'static str,
    }

    impl Migration for TestMigration {
        fn version(&self) -> MigrationVersion {
            self.version
        }
        fn name(&self) -> &'static str {
            self.name
        }
        fn up(&self) -> &'static str {
            self.up
        }
        fn down(&self) -> &'static str {
            self.down
        }
    }

    fn test_migrations() -> Vec<Box<dyn Migration>> {
        vec![
            Box::new(TestMigration {
                version: 1,
                name: "tables",
                up: "CREATE TABLE IF NOT EXISTS t1 (x INTEGER)",
                down: "DROP TABLE IF EXISTS t1",
            }),
            Box::new(TestMigration {
                version: 2,
                name: "more_tables",
                up: "CREATE TABLE IF NOT EXISTS t2 (x INTEGER)",
                down: "DROP TABLE IF EXISTS t2",
            }),
        ]
    }

    #[test]
    fn test_fresh_apply_then_noop_rerun() {
        let conn = open_connection(&StoreConfig::in_memory()).unwrap();
        let runner = MigrationRunner::new(conn);

        let result = runner.run(&test_migrations()).unwrap();
        assert_eq!(result.migrations_applied.len(), 2);
        assert_eq!(result.current_version, Some(2));

        // Second run applies nothing
        let result = runner.run(&test_migrations()).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.current_version, Some(2));
    }

    #[test]
    fn test_rollback_to_target() {
        let conn = open_connection(&StoreConfig::in_memory()).unwrap();
        MigrationRunner::new(conn.clone())
            .run(&test_migrations())
            .unwrap();

        let runner =
            MigrationRunner::with_config(conn, MigrationConfig::default().with_target_version(1));
        let result = runner.run(&test_migrations()).unwrap();
        assert_eq!(result.migrations_rolled_back.len(), 1);
        assert_eq!(result.migrations_rolled_back[0].version, 2);
        assert_eq!(result.current_version, Some(1));
    }

    #[test]
    fn test_drift_detection() {
        let conn = open_connection(&StoreConfig::in_memory()).unwrap();
        MigrationRunner::new(conn.clone())
            .run(&test_migrations())
            .unwrap();

        // Same versions, altered v1 SQL
        let drifted: Vec<Box<dyn Migration>> = vec![
            Box::new(TestMigration {
                version: 1,
                name: "tables",
                up: "CREATE TABLE IF NOT EXISTS t1 (x INTEGER, y INTEGER)",
                down: "DROP TABLE IF EXISTS t1",
            }),
            Box::new(TestMigration {
                version: 2,
                name: "more_tables",
                up: "CREATE TABLE IF NOT EXISTS t2 (x INTEGER)",
                down: "DROP TABLE IF EXISTS t2",
            }),
        ];
        let err = MigrationRunner::new(conn).run(&drifted).unwrap_err();
        assert!(matches!(err, StoreError::SchemaDrift(_)));
    }

    #[test]
    fn test_dry_run_applies_nothing() {
        let conn = open_connection(&StoreConfig::in_memory()).unwrap();
        let runner =
            MigrationRunner::with_config(conn.clone(), MigrationConfig::default().with_dry_run(true));
        let result = runner.run(&test_migrations()).unwrap();
        assert_eq!(result.migrations_applied.len(), 2);

        // Nothing recorded, nothing created
        assert_eq!(MigrationRunner::new(conn).status().unwrap().current_version, None);
    }
}
