use anyhow::{bail, Context, Result};
use strata_migrate::{MemoryBackend, MigrationStore, Migrator, SchemaIntrospector, SqlBackend};
use tracing::info;
use url::Url;

use crate::config::Settings;

/// Connect to the configured database
pub async fn connect(settings: &Settings) -> Result<SqlBackend> {
    let url = settings.require_database_url()?;
    info!(url = %mask_database_url(url), "Connecting to database");

    SqlBackend::connect(url, &settings.migrations.table_name, &settings.pool)
        .await
        .with_context(|| format!("Failed to connect to {}", mask_database_url(url)))
}

/// In-memory copy of the database's tables and migration records
///
/// Without a configured database the copy starts empty. Nothing is ever
/// written to the database, the record table is not even created.
pub async fn dry_run_backend(settings: &Settings) -> Result<MemoryBackend> {
    let memory = MemoryBackend::with_table_name(&settings.migrations.table_name);
    if settings.database_url.is_none() {
        info!("Dry run without a database: starting from an empty schema");
        return Ok(memory);
    }

    let backend = connect(settings).await?;
    let tables = backend.list_tables().await.context("Failed to list tables")?;
    for table in &tables {
        memory.seed_table(table)?;
    }

    if tables.contains(&settings.migrations.table_name) {
        let records = backend
            .list_all()
            .await
            .context("Failed to read migration records")?;
        for record in records.iter().rev() {
            memory.seed_record(&record.key, record.batch)?;
        }
    }

    backend.close().await;
    Ok(memory)
}

pub async fn drop_tables<B>(migrator: &Migrator<'_, B>, table: Option<&str>, all: bool) -> Result<()>
where
    B: MigrationStore + SchemaIntrospector,
{
    match (table, all) {
        (_, true) => {
            let dropped = migrator.drop_all().await?;
            if dropped.is_empty() {
                println!("No tables to drop");
            }
            for table in dropped {
                println!("Dropped table: {}", table);
            }
        }
        (Some(table), false) => {
            migrator.drop_table(table).await?;
            println!("Dropped table: {}", table);
        }
        (None, false) => bail!("Name a table to drop, or pass --all --force"),
    }
    Ok(())
}

pub async fn truncate<B>(migrator: &Migrator<'_, B>, table: &str) -> Result<()>
where
    B: MigrationStore + SchemaIntrospector,
{
    migrator.truncate(table).await?;
    println!("Truncated table: {}", table);
    Ok(())
}

pub async fn tables<B>(migrator: &Migrator<'_, B>) -> Result<()>
where
    B: MigrationStore + SchemaIntrospector,
{
    let tables = migrator.tables().await?;
    if tables.is_empty() {
        println!("No tables found");
    }
    for table in tables {
        println!("{}", table);
    }
    Ok(())
}

pub async fn exists<B>(migrator: &Migrator<'_, B>, table: &str) -> Result<bool>
where
    B: MigrationStore + SchemaIntrospector,
{
    let exists = migrator.table_exists(table).await?;
    if exists {
        println!("Table '{}' exists", table);
    } else {
        println!("Table '{}' does not exist", table);
    }
    Ok(exists)
}

fn mask_database_url(url_str: &str) -> String {
    match Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() && url.set_password(Some("****")).is_err() {
                return url_str.to_string();
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}
