//! SqlBackend against a real SQLite database file
//!
//! Runs the apply and rollback scenarios through `sqlx` with the in-process
//! SQLite driver, so no server is needed.

use tempfile::TempDir;

use strata_migrate::{
    MigrationStatus, MigrationStore, Migrator, Registry, SqlBackend, SqlMigration, SqlPoolConfig,
    Steps,
};

fn registry() -> Registry {
    let mut registry = Registry::new();
    for (key, table) in [
        ("001_create_alpha", "alpha"),
        ("002_create_beta", "beta"),
        ("003_create_gamma", "gamma"),
    ] {
        registry
            .register(SqlMigration::new(
                key,
                format!("CREATE TABLE {} (id INTEGER PRIMARY KEY)", table),
                format!("DROP TABLE {}", table),
            ))
            .unwrap();
    }
    registry
}

async fn connect(dir: &TempDir, table_name: &str) -> SqlBackend {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("strata.db").display());
    SqlBackend::connect(&url, table_name, &SqlPoolConfig::default())
        .await
        .unwrap()
}

async fn recorded(backend: &SqlBackend) -> Vec<(String, u32)> {
    let mut records: Vec<_> = backend
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|record| (record.key, record.batch))
        .collect();
    records.reverse();
    records
}

fn pairs(expected: &[(&str, u32)]) -> Vec<(String, u32)> {
    expected
        .iter()
        .map(|(key, batch)| (key.to_string(), *batch))
        .collect()
}

#[tokio::test]
async fn test_empty_database_starts_at_batch_one() {
    let dir = TempDir::new().unwrap();
    let backend = connect(&dir, "migrations").await;

    backend.ensure_schema().await.unwrap();
    assert_eq!(backend.max_batch().await.unwrap(), None);
    backend.close().await;
}

#[tokio::test]
async fn test_migrate_and_rollback_batches() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let migrator = Migrator::new(&registry, connect(&dir, "migrations").await);

    let report = migrator.migrate(Steps::Limit(2)).await.unwrap();
    assert_eq!(report.batch, Some(1));
    assert_eq!(report.applied, vec!["001_create_alpha", "002_create_beta"]);

    let report = migrator.migrate(Steps::Limit(1)).await.unwrap();
    assert_eq!(report.batch, Some(2));
    assert_eq!(
        recorded(migrator.backend()).await,
        pairs(&[
            ("001_create_alpha", 1),
            ("002_create_beta", 1),
            ("003_create_gamma", 2),
        ])
    );
    assert!(migrator.table_exists("gamma").await.unwrap());

    let report = migrator.migrate(Steps::All).await.unwrap();
    assert_eq!(report.batch, None);

    let report = migrator.rollback(Steps::Limit(1)).await.unwrap();
    assert_eq!(report.rolled_back, vec!["003_create_gamma"]);
    assert_eq!(report.batches, vec![2]);
    assert!(!migrator.table_exists("gamma").await.unwrap());

    let report = migrator.rollback(Steps::Limit(1)).await.unwrap();
    assert_eq!(report.rolled_back, vec!["002_create_beta", "001_create_alpha"]);
    assert_eq!(report.batches, vec![1]);
    assert!(recorded(migrator.backend()).await.is_empty());
    assert_eq!(migrator.tables().await.unwrap(), vec!["migrations"]);

    let status = migrator.status().await.unwrap();
    assert!(status
        .iter()
        .all(|entry| entry.status == MigrationStatus::Pending));

    migrator.backend().close().await;
}

#[tokio::test]
async fn test_failed_unit_leaves_no_record() {
    let dir = TempDir::new().unwrap();
    let mut registry = registry();
    registry
        .register(SqlMigration::new(
            "004_broken",
            "CREATE TABLE delta (id INTEGER PRIMARY KEY",
            "DROP TABLE delta",
        ))
        .unwrap();
    let migrator = Migrator::new(&registry, connect(&dir, "migrations").await);

    let err = migrator.migrate(Steps::All).await.unwrap_err();
    assert_eq!(err.key(), Some("004_broken"));
    assert_eq!(recorded(migrator.backend()).await.len(), 3);
    assert!(!migrator.table_exists("delta").await.unwrap());

    migrator.backend().close().await;
}

#[tokio::test]
async fn test_fresh_drops_keyword_tables_and_reapplies() {
    let dir = TempDir::new().unwrap();
    let mut registry = registry();
    registry
        .register(SqlMigration::new(
            "004_create_user",
            "CREATE TABLE \"user\" (id INTEGER PRIMARY KEY)",
            "DROP TABLE \"user\"",
        ))
        .unwrap();
    let migrator = Migrator::new(&registry, connect(&dir, "schema_history").await);

    migrator.migrate(Steps::Limit(2)).await.unwrap();
    migrator.migrate(Steps::All).await.unwrap();
    migrator.truncate("user").await.unwrap();

    let report = migrator.fresh().await.unwrap();
    assert_eq!(report.batch, Some(1));
    assert_eq!(report.applied.len(), 4);
    assert_eq!(
        migrator.tables().await.unwrap(),
        vec!["alpha", "beta", "gamma", "schema_history", "user"]
    );

    let dropped = migrator.drop_all().await.unwrap();
    assert_eq!(dropped.last().map(String::as_str), Some("schema_history"));
    assert!(migrator.tables().await.unwrap().is_empty());

    migrator.backend().close().await;
}
