//! CLI settings
//!
//! Resolved from, lowest precedence first: built-in defaults, `strata.toml`,
//! environment variables and command-line flags. Clap reads the environment
//! variables for each flag, so flags and their variables are applied in one
//! step on top of the file.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use strata_migrate::{ConfigError, MigrationConfig, OrphanPolicy, SqlPoolConfig};

/// Config file looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "strata.toml";

/// Contents of `strata.toml`
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub database: DatabaseSection,
    pub migrations: MigrationConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSection {
    pub url: Option<String>,
    pub max_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }

    /// Read `path`, or the default file when it exists; defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }
}

/// Values given on the command line (or through their environment variables)
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub database_url: Option<String>,
    pub migrations_dir: Option<PathBuf>,
    pub table_name: Option<String>,
    pub orphan_policy: Option<OrphanPolicy>,
}

/// Fully resolved settings for one invocation
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub pool: SqlPoolConfig,
    pub migrations: MigrationConfig,
}

impl Settings {
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self> {
        let mut pool = SqlPoolConfig::default();
        if let Some(max_connections) = file.database.max_connections {
            if max_connections == 0 {
                bail!(ConfigError::InvalidValue {
                    field: "database.max_connections".to_string(),
                    value: max_connections.to_string(),
                    expected: "a positive number".to_string(),
                });
            }
            pool.max_connections = max_connections;
            pool.min_connections = pool.min_connections.min(max_connections);
        }
        if let Some(timeout) = file.database.acquire_timeout_secs {
            pool.acquire_timeout = timeout;
        }

        let mut migrations = file.migrations;
        if let Some(dir) = overrides.migrations_dir {
            migrations.migrations_dir = dir;
        }
        if let Some(table) = overrides.table_name {
            migrations.table_name = table;
        }
        if let Some(policy) = overrides.orphan_policy {
            migrations.orphan_policy = policy;
        }
        migrations.validate()?;

        Ok(Self {
            database_url: overrides.database_url.or(file.database.url),
            pool,
            migrations,
        })
    }

    /// Database URL, required by every command that talks to the database
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingRequired {
                field: "database_url".to_string(),
                hint: "Pass --database-url, set DATABASE_URL or [database].url in strata.toml"
                    .to_string(),
            })
    }
}
