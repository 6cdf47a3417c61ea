//! Migration Manager - File system operations for migrations
//!
//! Handles creating, loading, and parsing SQL migration files. A file
//! `20240101_120000_create_users.sql` becomes a [`SqlMigration`] keyed
//! `20240101_120000_create_users`; files register in file name order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use super::definitions::MigrationUnit;
use super::registry::Registry;
use super::sql_migration::SqlMigration;
use crate::config::MigrationConfig;
use crate::error::{MigrationError, MigrationResult};

/// Migration manager for creating and loading SQL migration files
pub struct MigrationManager {
    migrations_dir: PathBuf,
}

impl MigrationManager {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(&config.migrations_dir)
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Create a new migration file and return its file name
    pub async fn create_migration(&self, name: &str) -> MigrationResult<String> {
        tokio::fs::create_dir_all(&self.migrations_dir)
            .await
            .map_err(|e| MigrationError::io("Failed to create migrations directory", e))?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let slug = name.trim().replace(' ', "_").to_lowercase();
        let migration_id = format!("{}_{}", timestamp, slug);
        let filename = format!("{}.sql", migration_id);
        let filepath = self.migrations_dir.join(&filename);

        let template = migration_template(name, &migration_id);
        tokio::fs::write(&filepath, template)
            .await
            .map_err(|e| MigrationError::io("Failed to write migration file", e))?;

        Ok(filename)
    }

    /// Load all migration files from the migrations directory, sorted by name
    pub async fn load_migrations(&self) -> MigrationResult<Vec<SqlMigration>> {
        if !self.migrations_dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.migrations_dir)
            .await
            .map_err(|e| MigrationError::io("Failed to read migrations directory", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| MigrationError::io("Failed to read directory entry", e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "sql") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut migrations = Vec::with_capacity(paths.len());
        for path in paths {
            migrations.push(self.parse_migration_file(&path).await?);
        }
        Ok(migrations)
    }

    /// Load every migration file into a fresh registry
    pub async fn load_registry(&self) -> MigrationResult<Registry> {
        let mut registry = Registry::new();
        for migration in self.load_migrations().await? {
            let unit: Arc<dyn MigrationUnit> = Arc::new(migration);
            registry.register_arc(unit)?;
        }
        debug!(count = registry.len(), dir = %self.migrations_dir.display(), "loaded migrations");
        Ok(registry)
    }

    async fn parse_migration_file(&self, path: &Path) -> MigrationResult<SqlMigration> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MigrationError::io("Failed to read migration file", e))?;

        let key = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| MigrationError::Io {
                context: format!("Invalid migration filename: {}", path.display()),
                source: std::io::ErrorKind::InvalidInput.into(),
            })?;

        let (up_sql, down_sql) = parse_migration_content(&content);
        Ok(SqlMigration::new(key, up_sql, down_sql))
    }
}

enum Section {
    Preamble,
    Up,
    Down,
}

impl Section {
    /// Section started by a marker line such as `-- Up migration` or `-- down`
    fn from_marker(line: &str) -> Option<Self> {
        let comment = line.strip_prefix("--")?.trim().to_lowercase();
        match comment.as_str() {
            "up" | "up migration" => Some(Section::Up),
            "down" | "down migration" => Some(Section::Down),
            _ => None,
        }
    }
}

/// Split a migration file into its UP and DOWN SQL
pub fn parse_migration_content(content: &str) -> (String, String) {
    let mut up_sql = Vec::new();
    let mut down_sql = Vec::new();
    let mut current_section = Section::Preamble;

    for line in content.lines() {
        let trimmed = line.trim();

        if let Some(section) = Section::from_marker(trimmed) {
            current_section = section;
            continue;
        }

        // Skip comment lines and empty lines
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }

        match current_section {
            Section::Up => up_sql.push(line),
            Section::Down => down_sql.push(line),
            Section::Preamble => {}
        }
    }

    (
        up_sql.join("\n").trim().to_string(),
        down_sql.join("\n").trim().to_string(),
    )
}

fn migration_template(name: &str, migration_id: &str) -> String {
    format!(
        "-- Migration: {}\n\
         -- ID: {}\n\
         -- Created: {}\n\n\
         -- Up migration\n\n\n\
         -- Down migration\n\n",
        name,
        migration_id,
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_migration() {
        let temp_dir = TempDir::new().unwrap();
        let manager = MigrationManager::new(temp_dir.path().join("migrations"));

        let filename = manager.create_migration("Create users table").await.unwrap();
        assert!(filename.ends_with("_create_users_table.sql"));

        let content = fs::read_to_string(manager.migrations_dir().join(&filename)).unwrap();
        assert!(content.contains("-- Migration: Create users table"));
        assert!(content.contains("-- Up migration"));
        assert!(content.contains("-- Down migration"));

        let loaded = manager.load_migrations().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].up_sql(), "");
    }

    #[tokio::test]
    async fn test_load_migrations_in_file_name_order() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("20240101_130000_create_posts.sql"),
            "-- Up migration\nCREATE TABLE posts (id INT);\n-- Down migration\nDROP TABLE posts;",
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("20240101_120000_create_users.sql"),
            "-- Migration: users\n-- Up migration\nCREATE TABLE users (id INT);\n\n-- Down migration\nDROP TABLE users;\n",
        )
        .unwrap();
        fs::write(temp_dir.path().join("README.md"), "not a migration").unwrap();

        let manager = MigrationManager::new(temp_dir.path());
        let registry = manager.load_registry().await.unwrap();

        let keys: Vec<_> = registry.keys().collect();
        assert_eq!(
            keys,
            vec!["20240101_120000_create_users", "20240101_130000_create_posts"]
        );

        let migrations = manager.load_migrations().await.unwrap();
        assert_eq!(migrations[0].up_sql(), "CREATE TABLE users (id INT);");
        assert_eq!(migrations[0].down_sql(), "DROP TABLE users;");
    }

    #[tokio::test]
    async fn test_missing_directory_loads_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let manager = MigrationManager::new(temp_dir.path().join("absent"));
        assert!(manager.load_registry().await.unwrap().is_empty());
    }

    #[test]
    fn test_parse_sections() {
        let (up, down) = parse_migration_content(
            "-- up\nALTER TABLE users ADD COLUMN email TEXT;\n-- a note\n-- down\nALTER TABLE users DROP COLUMN email;",
        );
        assert_eq!(up, "ALTER TABLE users ADD COLUMN email TEXT;");
        assert_eq!(down, "ALTER TABLE users DROP COLUMN email;");
    }

    #[test]
    fn test_comments_resembling_markers_keep_their_section() {
        let (up, down) = parse_migration_content(
            "-- Up migration\n\
             -- update the accounts table\n\
             CREATE TABLE accounts (id INT);\n\
             -- downstream jobs read this\n\
             ALTER TABLE accounts ADD COLUMN x INT;\n\
             -- Down migration\n\
             DROP TABLE accounts;",
        );
        assert_eq!(
            up,
            "CREATE TABLE accounts (id INT);\nALTER TABLE accounts ADD COLUMN x INT;"
        );
        assert_eq!(down, "DROP TABLE accounts;");
    }

    #[test]
    fn test_marker_lines_are_case_insensitive() {
        let (up, down) = parse_migration_content(
            "  --   UP  \nCREATE TABLE t (id INT);\n-- DOWN MIGRATION\nDROP TABLE t;\n-- up migration notes\nSELECT 1;",
        );
        assert_eq!(up, "CREATE TABLE t (id INT);");
        assert_eq!(down, "DROP TABLE t;\nSELECT 1;");
    }
}
