//! Versioned schema migrations
//!
//! The unified schema is established by an ordered migration list,
//! applied exactly once and tracked in a `schema_migrations` table in
//! the same database. Checksums of applied migrations are verified on
//! every run so schema drift is caught before new DDL executes.

mod definitions;
mod registry;
mod runner;
mod v001_unified_schema;
mod v002_ingestion_indexes;

pub use definitions::{
    AppliedMigration, Migration, MigrationConfig, MigrationDirection, MigrationResult,
    MigrationVersion,
};
pub use registry::{compute_checksum, MigrationRegistry};
pub use runner::{MigrationRunner, MigrationStatus};
pub use v001_unified_schema::V001UnifiedSchema;
pub use v002_ingestion_indexes::V002IngestionIndexes;

/// The full ordered migration list for the unified schema
pub fn all_migrations() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(V001UnifiedSchema),
        Box::new(V002IngestionIndexes),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_list_is_ordered_and_unique() {
        let migrations = all_migrations();
        let versions: Vec<_> = migrations.iter().map(|m| m.version()).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(versions, sorted);
        assert_eq!(versions.first(), Some(&1));
    }
}
