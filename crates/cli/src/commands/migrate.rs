use anyhow::{Context, Result};
use strata_migrate::{
    MigrateReport, MigrationConfig, MigrationManager, MigrationStatus, MigrationStore, Migrator,
    RollbackReport, SchemaIntrospector, StatusEntry, Steps,
};

pub async fn create(config: &MigrationConfig, name: &str) -> Result<()> {
    let manager = MigrationManager::from_config(config);
    let filename = manager
        .create_migration(name)
        .await
        .with_context(|| format!("Failed to create migration '{}'", name))?;

    println!(
        "Created migration: {}",
        manager.migrations_dir().join(filename).display()
    );
    Ok(())
}

pub async fn run<B: MigrationStore>(migrator: &Migrator<'_, B>, steps: Steps) -> Result<()> {
    let report = migrator.migrate(steps).await?;
    print_migrate_report(&report);
    Ok(())
}

pub async fn rollback<B: MigrationStore>(migrator: &Migrator<'_, B>, steps: Steps) -> Result<()> {
    let report = migrator.rollback(steps).await?;
    print_rollback_report(&report);
    Ok(())
}

pub async fn reset<B: MigrationStore>(migrator: &Migrator<'_, B>) -> Result<()> {
    let report = migrator.reset().await?;
    print_rollback_report(&report);
    Ok(())
}

pub async fn fresh<B>(migrator: &Migrator<'_, B>) -> Result<()>
where
    B: MigrationStore + SchemaIntrospector,
{
    let report = migrator.fresh().await?;
    print_migrate_report(&report);
    Ok(())
}

pub async fn status<B: MigrationStore>(migrator: &Migrator<'_, B>, json: bool) -> Result<()> {
    let entries = migrator.status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        print!("{}", render_status(&entries));
    }
    Ok(())
}

fn print_migrate_report(report: &MigrateReport) {
    match report.batch {
        None => println!("Nothing to migrate"),
        Some(batch) => {
            for key in &report.applied {
                println!("Migrated: {}", key);
            }
            println!(
                "Applied {} migration(s) in batch {} ({} ms)",
                report.applied_count(),
                batch,
                report.execution_time_ms
            );
        }
    }
}

fn print_rollback_report(report: &RollbackReport) {
    if report.is_empty() {
        println!("Nothing to roll back");
        return;
    }

    for key in &report.rolled_back {
        println!("Rolled back: {}", key);
    }
    for key in &report.skipped {
        println!("Skipped (not registered, record kept): {}", key);
    }
    for key in &report.forgotten {
        println!("Forgotten (not registered, record deleted): {}", key);
    }

    let batches: Vec<String> = report.batches.iter().map(u32::to_string).collect();
    println!(
        "Rolled back {} migration(s) from batch(es) {} ({} ms)",
        report.rolled_back_count(),
        batches.join(", "),
        report.execution_time_ms
    );
}

fn render_status(entries: &[StatusEntry]) -> String {
    let mut out = String::from("Migration Status:\n================\n");
    if entries.is_empty() {
        out.push_str("No migrations found\n");
        return out;
    }

    for entry in entries {
        let line = match entry.status {
            MigrationStatus::Applied { batch } => format!("  ✅ {} (batch {})\n", entry.key, batch),
            MigrationStatus::Pending => format!("  ⏳ {}\n", entry.key),
            MigrationStatus::Orphaned { batch } => {
                format!("  ⚠️  {} (batch {}, not registered)\n", entry.key, batch)
            }
        };
        out.push_str(&line);
    }
    out.push_str("\n✅ = Applied, ⏳ = Pending, ⚠️ = Applied but missing from the migrations directory\n");
    out
}
