//! Maintenance operations over the schema introspection interface

use tracing::{info, warn};

use super::definitions::{MigrateReport, Steps};
use super::runner::Migrator;
use crate::backends::{MigrationStore, SchemaIntrospector};
use crate::error::{MigrationError, MigrationResult, Operation};
use crate::security::validate_table_name;

impl<'r, B: MigrationStore + SchemaIntrospector> Migrator<'r, B> {
    /// Drop every table, the record table included, then apply every unit
    pub async fn fresh(&self) -> MigrationResult<MigrateReport> {
        self.drop_tables(Operation::Fresh).await?;
        self.migrate(Steps::All).await
    }

    /// Drop every table and return the names dropped
    pub async fn drop_all(&self) -> MigrationResult<Vec<String>> {
        self.drop_tables(Operation::DropTable).await
    }

    pub async fn drop_table(&self, name: &str) -> MigrationResult<()> {
        validated(Operation::DropTable, name)?;
        self.backend()
            .drop_table(name)
            .await
            .map_err(|e| MigrationError::introspection(Operation::DropTable, Some(name), e))?;
        info!(table = name, "Dropped table");
        Ok(())
    }

    /// Remove every row of `name`
    pub async fn truncate(&self, name: &str) -> MigrationResult<()> {
        validated(Operation::Truncate, name)?;
        self.backend()
            .truncate_table(name)
            .await
            .map_err(|e| MigrationError::introspection(Operation::Truncate, Some(name), e))?;
        info!(table = name, "Truncated table");
        Ok(())
    }

    /// Names of every table in the current schema
    pub async fn tables(&self) -> MigrationResult<Vec<String>> {
        self.backend()
            .list_tables()
            .await
            .map_err(|e| MigrationError::introspection(Operation::ListTables, None, e))
    }

    pub async fn table_exists(&self, name: &str) -> MigrationResult<bool> {
        validated(Operation::TableExists, name)?;
        let tables = self
            .backend()
            .list_tables()
            .await
            .map_err(|e| MigrationError::introspection(Operation::TableExists, Some(name), e))?;
        Ok(tables.iter().any(|table| table == name))
    }

    /// Drop every listed table, the record table last
    async fn drop_tables(&self, operation: Operation) -> MigrationResult<Vec<String>> {
        let mut tables = self
            .backend()
            .list_tables()
            .await
            .map_err(|e| MigrationError::introspection(operation, None, e))?;

        if tables.is_empty() {
            warn!(%operation, "No tables to drop");
        }

        let record_table = self.backend().record_table();
        if let Some(index) = tables.iter().position(|table| table == record_table) {
            let table = tables.remove(index);
            tables.push(table);
        }

        for table in &tables {
            self.backend()
                .drop_table(table)
                .await
                .map_err(|e| MigrationError::introspection(operation, Some(table), e))?;
            info!(table = %table, "Dropped table");
        }
        Ok(tables)
    }
}

fn validated(operation: Operation, name: &str) -> MigrationResult<()> {
    validate_table_name(name).map_err(|e| MigrationError::introspection(operation, Some(name), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;
    use crate::error::DatabaseError;
    use crate::migrations::registry::Registry;
    use crate::migrations::sql_migration::SqlMigration;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(SqlMigration::new(
                "001_create_users",
                "CREATE TABLE users (id INT)",
                "DROP TABLE users",
            ))
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_fresh_rebuilds_from_scratch() {
        let registry = registry();
        let backend = MemoryBackend::new();
        backend.seed_table("leftover").unwrap();
        backend.seed_record("001_create_users", 4).unwrap();
        let migrator = Migrator::new(&registry, backend);

        let report = migrator.fresh().await.unwrap();
        assert_eq!(report.batch, Some(1));
        assert_eq!(report.applied, vec!["001_create_users"]);
        assert_eq!(migrator.backend().tables(), vec!["migrations", "users"]);
    }

    #[tokio::test]
    async fn test_fresh_drops_keyword_tables() {
        let mut registry = Registry::new();
        registry
            .register(SqlMigration::new(
                "001_create_user",
                "CREATE TABLE user (id INT)",
                "DROP TABLE user",
            ))
            .unwrap();
        let migrator = Migrator::new(&registry, MemoryBackend::new());
        migrator.migrate(Steps::All).await.unwrap();

        let report = migrator.fresh().await.unwrap();
        assert_eq!(report.batch, Some(1));
        assert_eq!(migrator.backend().tables(), vec!["migrations", "user"]);

        let dropped = migrator.drop_all().await.unwrap();
        assert_eq!(dropped, vec!["user", "migrations"]);
        assert!(migrator.backend().tables().is_empty());
    }

    #[tokio::test]
    async fn test_record_table_survives_a_failed_drop() {
        let registry = registry();
        let backend = MemoryBackend::new();
        backend.seed_record("001_create_users", 1).unwrap();
        backend.seed_table("bad;name").unwrap();
        let migrator = Migrator::new(&registry, backend);

        assert!(migrator.drop_all().await.is_err());
        assert_eq!(migrator.backend().records().len(), 1);
        assert!(migrator.backend().has_table("migrations"));
    }

    #[tokio::test]
    async fn test_table_exists_and_truncate() {
        let registry = registry();
        let migrator = Migrator::new(&registry, MemoryBackend::new());
        migrator.migrate(Steps::All).await.unwrap();

        assert!(migrator.table_exists("users").await.unwrap());
        assert!(!migrator.table_exists("posts").await.unwrap());
        assert_eq!(migrator.tables().await.unwrap(), vec!["migrations", "users"]);
        migrator.truncate("users").await.unwrap();

        let err = migrator.truncate("posts").await.unwrap_err();
        assert!(matches!(
            err,
            MigrationError::Introspection {
                operation: Operation::Truncate,
                source: DatabaseError::Schema(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unsafe_table_name_is_rejected() {
        let registry = registry();
        let migrator = Migrator::new(&registry, MemoryBackend::new());

        let err = migrator.drop_table("users; DROP TABLE x").await.unwrap_err();
        assert!(matches!(
            err.database_error(),
            Some(DatabaseError::Validation(_))
        ));
    }
}
