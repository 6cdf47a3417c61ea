mod commands;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use strata_migrate::{
    MigrationManager, MigrationStore, Migrator, OrphanPolicy, SchemaIntrospector, Steps,
};
use tracing_subscriber::EnvFilter;

use commands::*;
use config::{FileConfig, Overrides, Settings};

#[derive(Parser)]
#[command(name = "strata", version)]
#[command(about = "Batch-based schema migrations")]
struct Cli {
    /// Config file (defaults to ./strata.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database connection URL
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    /// Directory holding the SQL migration files
    #[arg(long, env = "STRATA_MIGRATIONS_DIR", global = true)]
    dir: Option<PathBuf>,

    /// Name of the migration record table
    #[arg(long, env = "STRATA_MIGRATIONS_TABLE", global = true)]
    table: Option<String>,

    /// What rollback does with records of unknown migrations: fail, skip or forget
    #[arg(long, env = "STRATA_ORPHAN_POLICY", global = true)]
    orphan_policy: Option<OrphanPolicy>,

    /// Run against an in-memory copy of the database and report what would happen
    #[arg(long, global = true)]
    dry_run: bool,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            database_url: self.database_url.clone(),
            migrations_dir: self.dir.clone(),
            table_name: self.table.clone(),
            orphan_policy: self.orphan_policy,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new migration file
    Create {
        /// Migration name
        name: String,
    },

    #[command(flatten)]
    Database(DatabaseCommands),
}

#[derive(Subcommand)]
enum DatabaseCommands {
    /// Run pending migrations
    Migrate {
        /// Apply at most this many migrations
        #[arg(long)]
        step: Option<usize>,
    },

    /// Roll back the most recent batches
    Rollback {
        /// Number of batches to roll back
        #[arg(long, default_value_t = 1)]
        step: usize,
    },

    /// Roll back every batch
    Reset,

    /// Drop every table and run all migrations again
    Fresh {
        /// Confirm dropping every table
        #[arg(long)]
        force: bool,
    },

    /// Show migration status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drop a table, or every table with --all
    Drop {
        /// Table name
        #[arg(required_unless_present = "all")]
        table: Option<String>,

        /// Drop every table
        #[arg(long, conflicts_with = "table")]
        all: bool,

        /// Confirm dropping every table (only with --all)
        #[arg(long)]
        force: bool,
    },

    /// Remove every row from a table
    Truncate {
        /// Table name
        table: String,
    },

    /// List the tables of the current schema
    Tables,

    /// Check whether a table exists (exit code 1 when it does not)
    Exists {
        /// Table name
        table: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let file = FileConfig::load(cli.config.as_deref())?;
    let settings = Settings::resolve(file, cli.overrides())?;

    match cli.command {
        Commands::Create { name } => {
            migrate::create(&settings.migrations, &name).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Database(command) => {
            let registry = MigrationManager::from_config(&settings.migrations)
                .load_registry()
                .await?;

            if cli.dry_run {
                let backend = database::dry_run_backend(&settings).await?;
                let migrator = Migrator::new(&registry, backend)
                    .with_orphan_policy(settings.migrations.orphan_policy);
                let code = execute(command, &migrator, true).await?;
                println!("Dry run: nothing was written to the database");
                Ok(code)
            } else {
                let backend = database::connect(&settings).await?;
                let migrator = Migrator::new(&registry, backend)
                    .with_orphan_policy(settings.migrations.orphan_policy);
                let result = execute(command, &migrator, false).await;
                migrator.backend().close().await;
                result
            }
        }
    }
}

async fn execute<B>(
    command: DatabaseCommands,
    migrator: &Migrator<'_, B>,
    dry_run: bool,
) -> Result<ExitCode>
where
    B: MigrationStore + SchemaIntrospector,
{
    match command {
        DatabaseCommands::Migrate { step } => {
            migrate::run(migrator, Steps::from(step)).await?;
        }
        DatabaseCommands::Rollback { step } => {
            migrate::rollback(migrator, Steps::Limit(step)).await?;
        }
        DatabaseCommands::Reset => {
            migrate::reset(migrator).await?;
        }
        DatabaseCommands::Fresh { force } => {
            if !force && !dry_run {
                bail!("fresh drops every table; pass --force to confirm");
            }
            migrate::fresh(migrator).await?;
        }
        DatabaseCommands::Status { json } => {
            migrate::status(migrator, json).await?;
        }
        DatabaseCommands::Drop { table, all, force } => {
            if force && !all {
                bail!("--force only confirms drop --all");
            }
            if all && !force && !dry_run {
                bail!("drop --all drops every table; pass --force to confirm");
            }
            database::drop_tables(migrator, table.as_deref(), all).await?;
        }
        DatabaseCommands::Truncate { table } => {
            database::truncate(migrator, &table).await?;
        }
        DatabaseCommands::Tables => {
            database::tables(migrator).await?;
        }
        DatabaseCommands::Exists { table } => {
            if !database::exists(migrator, &table).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use strata_migrate::{MemoryBackend, Registry};

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::try_parse_from(["strata", "migrate", "--step", "2"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Database(DatabaseCommands::Migrate { step: Some(2) })
        ));

        let cli = Cli::try_parse_from(["strata", "rollback"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Database(DatabaseCommands::Rollback { step: 1 })
        ));

        let cli = Cli::try_parse_from([
            "strata",
            "--dry-run",
            "--orphan-policy",
            "forget",
            "drop",
            "--all",
            "--force",
        ])
        .unwrap();
        assert!(cli.dry_run);
        assert_eq!(cli.orphan_policy, Some(OrphanPolicy::Forget));
        assert!(matches!(
            cli.command,
            Commands::Database(DatabaseCommands::Drop { table: None, all: true, force: true })
        ));
    }

    #[test]
    fn test_drop_needs_a_table_or_all() {
        assert!(Cli::try_parse_from(["strata", "drop"]).is_err());
        assert!(Cli::try_parse_from(["strata", "drop", "users", "--all"]).is_err());
        assert!(Cli::try_parse_from(["strata", "--orphan-policy", "ignore", "reset"]).is_err());
    }

    #[tokio::test]
    async fn test_force_without_all_is_rejected() {
        let cli = Cli::try_parse_from(["strata", "drop", "users", "--force"]).unwrap();
        let Commands::Database(command) = cli.command else {
            panic!("expected a database command");
        };

        let registry = Registry::new();
        let backend = MemoryBackend::new();
        backend.seed_table("users").unwrap();
        let migrator = Migrator::new(&registry, backend);

        assert!(execute(command, &migrator, false).await.is_err());
        assert!(migrator.backend().has_table("users"));
    }

    #[tokio::test]
    async fn test_drop_all_requires_force_outside_dry_run() {
        let registry = Registry::new();
        let backend = MemoryBackend::new();
        backend.seed_table("users").unwrap();
        let migrator = Migrator::new(&registry, backend);

        let command = DatabaseCommands::Drop {
            table: None,
            all: true,
            force: false,
        };
        assert!(execute(command, &migrator, false).await.is_err());
        assert!(migrator.backend().has_table("users"));

        let command = DatabaseCommands::Drop {
            table: None,
            all: true,
            force: true,
        };
        execute(command, &migrator, false).await.unwrap();
        assert!(migrator.backend().tables().is_empty());
    }
}
