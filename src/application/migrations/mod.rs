//! Schema migration engine
//!
//! Migrations are `<version>_<description>.sql` files with an Up section and
//! a Down section split by a `-- Down` line. Every migration is applied or
//! rolled back inside its own transaction, together with its version row.

pub mod parser;

use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::errors::{DatabaseError, MigrationError};
use crate::domain::entities::{AppliedMigration, Migration, MigrationStatus, PendingMigration};
use crate::domain::traits::Database;
use crate::infrastructure::database::VERSION_TABLE;

pub use parser::{parse_file_name, parse_migration, render_template, slugify, DOWN_MARKER};

pub struct MigrationEngine {
    db: Arc<dyn Database>,
    dir: PathBuf,
}

impl MigrationEngine {
    pub fn new(db: Arc<dyn Database>, dir: impl Into<PathBuf>) -> Self {
        Self { db, dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read every migration file, sorted by version
    pub async fn load(&self) -> Result<Vec<Migration>, MigrationError> {
        let mut migrations: BTreeMap<i64, Migration> = BTreeMap::new();

        if !self.dir.exists() {
            warn!("Migration directory does not exist: {}", self.dir.display());
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if !file_name.ends_with(".sql") {
                continue;
            }
            if parse_file_name(&file_name).is_none() {
                warn!(file = %file_name, "Skipping migration with invalid file name");
                continue;
            }

            let content = tokio::fs::read_to_string(&path).await?;
            let Some(migration) = parse_migration(&file_name, &content) else {
                continue;
            };

            if let Some(existing) = migrations.get(&migration.version) {
                return Err(MigrationError::DuplicateVersion {
                    version: migration.version,
                    first: existing.file_name.clone(),
                    second: migration.file_name,
                });
            }
            migrations.insert(migration.version, migration);
        }

        Ok(migrations.into_values().collect())
    }

    pub async fn ensure_table(&self) -> Result<(), MigrationError> {
        self.db
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (\n\
                     version INTEGER PRIMARY KEY,\n\
                     description TEXT NOT NULL,\n\
                     applied_at TEXT NOT NULL\n\
                 )",
                VERSION_TABLE
            ))
            .await?;
        Ok(())
    }

    /// Rows of the version table, ascending
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        self.ensure_table().await?;
        let rows = self.db
            .query(
                &format!("SELECT version, description, applied_at FROM {} ORDER BY version", VERSION_TABLE),
                &[],
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| AppliedMigration {
                version: row["version"].as_i64().unwrap_or_default(),
                description: row["description"].as_str().unwrap_or_default().to_string(),
                applied_at: row["applied_at"].as_str().unwrap_or_default().to_string(),
            })
            .collect())
    }

    pub async fn current_version(&self) -> Result<i64, MigrationError> {
        Ok(self.db.get_version().await?)
    }

    /// Apply pending migrations above the current version, up to `target`.
    /// Stops at the first failure. Returns the applied versions.
    pub async fn migrate(&self, target: Option<i64>) -> Result<Vec<i64>, MigrationError> {
        self.ensure_table().await?;
        let current = self.current_version().await?;
        let target = target.unwrap_or(i64::MAX);

        let pending: Vec<Migration> = self.load()
            .await?
            .into_iter()
            .filter(|m| m.version > current && m.version <= target)
            .collect();

        if pending.is_empty() {
            debug!(current, "Schema up to date");
            return Ok(Vec::new());
        }

        let mut applied = Vec::new();
        for migration in pending {
            self.apply(&migration).await?;
            info!(version = migration.version, description = %migration.description, "Applied migration");
            applied.push(migration.version);
        }
        Ok(applied)
    }

    async fn apply(&self, migration: &Migration) -> Result<(), MigrationError> {
        let record = format!(
            "INSERT INTO {} (version, description, applied_at) VALUES (?1, ?2, ?3)",
            VERSION_TABLE
        );
        let params = [
            json!(migration.version),
            json!(migration.description),
            json!(chrono::Utc::now().to_rfc3339()),
        ];

        self.in_transaction(migration, async {
            if !migration.up.is_empty() {
                self.db.execute_batch(&migration.up).await?;
            }
            self.db.execute(&record, &params).await?;
            Ok::<(), DatabaseError>(())
        })
        .await
    }

    /// Undo the `steps` most recently applied migrations, newest first.
    /// Stops at the first failure. Returns the rolled back versions.
    pub async fn rollback(&self, steps: usize) -> Result<Vec<i64>, MigrationError> {
        let mut applied = self.applied().await?;
        applied.reverse();
        applied.truncate(steps);
        if applied.is_empty() {
            debug!("Nothing to roll back");
            return Ok(Vec::new());
        }

        let files: BTreeMap<i64, Migration> = self.load()
            .await?
            .into_iter()
            .map(|m| (m.version, m))
            .collect();

        let delete = format!("DELETE FROM {} WHERE version = ?1", VERSION_TABLE);
        let mut rolled_back = Vec::new();
        for row in applied {
            let migration = files.get(&row.version).ok_or(MigrationError::MissingFile(row.version))?;
            if !migration.has_down() {
                return Err(MigrationError::MissingDown(row.version));
            }

            self.in_transaction(migration, async {
                self.db.execute_batch(&migration.down).await?;
                self.db.execute(&delete, &[json!(migration.version)]).await?;
                Ok::<(), DatabaseError>(())
            })
            .await?;

            info!(version = migration.version, description = %migration.description, "Rolled back migration");
            rolled_back.push(migration.version);
        }
        Ok(rolled_back)
    }

    /// Run `work` inside a transaction; roll back and report on failure
    async fn in_transaction<F>(&self, migration: &Migration, work: F) -> Result<(), MigrationError>
    where
        F: std::future::Future<Output = Result<(), DatabaseError>>,
    {
        let failed = |source| MigrationError::Failed {
            version: migration.version,
            description: migration.description.clone(),
            source,
        };

        self.db.begin_transaction().await?;
        let result = match work.await {
            Ok(()) => self.db.commit().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            if self.db.in_transaction() {
                if let Err(rollback_err) = self.db.rollback().await {
                    warn!(version = migration.version, error = %rollback_err, "Failed to roll back migration transaction");
                }
            }
            tracing::error!(version = migration.version, error = %e, "Migration failed");
            return Err(failed(e));
        }
        Ok(())
    }

    /// Applied and pending migrations with the current version
    pub async fn status(&self) -> Result<MigrationStatus, MigrationError> {
        let applied = self.applied().await?;
        let known: HashSet<i64> = applied.iter().map(|m| m.version).collect();
        let pending = self.load()
            .await?
            .into_iter()
            .filter(|m| !known.contains(&m.version))
            .map(|m| PendingMigration { version: m.version, description: m.description })
            .collect();

        Ok(MigrationStatus {
            current_version: self.current_version().await?,
            applied,
            pending,
        })
    }

    /// Scaffold the next migration file. Returns its path.
    pub async fn create(&self, description: &str) -> Result<PathBuf, MigrationError> {
        let slug = slugify(description)?;
        let version = self.load().await?.last().map(|m| m.version + 1).unwrap_or(1);

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{:03}_{}.sql", version, slug));
        let content = render_template(version, description.trim());

        // Never clobber an existing file
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        tokio::io::AsyncWriteExt::write_all(&mut file, content.as_bytes()).await?;

        info!(version, path = %path.display(), "Created migration");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::SqliteDatabase;

    fn engine(dir: &Path) -> MigrationEngine {
        MigrationEngine::new(Arc::new(SqliteDatabase::open_in_memory().unwrap()), dir)
    }

    #[tokio::test]
    async fn test_duplicate_versions_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001_a.sql"), "SELECT 1;").unwrap();
        std::fs::write(dir.path().join("1_b.sql"), "SELECT 1;").unwrap();

        let err = engine(dir.path()).load().await.unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateVersion { version: 1, .. }));
    }

    #[tokio::test]
    async fn test_invalid_names_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.sql"), "SELECT 1;").unwrap();
        std::fs::write(dir.path().join("002_wallets.sql"), "CREATE TABLE w (id INTEGER);").unwrap();

        let migrations = engine(dir.path()).load().await.unwrap();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].version, 2);
    }

    #[tokio::test]
    async fn test_rollback_without_down_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001_a.sql"), "CREATE TABLE a (id INTEGER);").unwrap();

        let engine = engine(dir.path());
        assert_eq!(engine.migrate(None).await.unwrap(), vec![1]);
        assert!(matches!(engine.rollback(1).await, Err(MigrationError::MissingDown(1))));
        assert_eq!(engine.current_version().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_numbers_after_existing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("007_a.sql"), "SELECT 1;").unwrap();

        let engine = engine(dir.path());
        let path = engine.create("Add Wallets").await.unwrap();
        assert_eq!(path.file_name().unwrap(), "008_add_wallets.sql");

        let migrations = engine.load().await.unwrap();
        assert_eq!(migrations.last().unwrap().version, 8);
        assert!(migrations.last().unwrap().has_down());
    }

    #[tokio::test]
    async fn test_status_lists_pending() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001_a.sql"), "CREATE TABLE a (id INTEGER);\n-- Down\nDROP TABLE a;").unwrap();
        std::fs::write(dir.path().join("002_b.sql"), "CREATE TABLE b (id INTEGER);\n-- Down\nDROP TABLE b;").unwrap();

        let engine = engine(dir.path());
        engine.migrate(Some(1)).await.unwrap();

        let status = engine.status().await.unwrap();
        assert_eq!(status.current_version, 1);
        assert_eq!(status.applied.len(), 1);
        assert_eq!(status.pending, vec![PendingMigration { version: 2, description: "b".to_string() }]);
    }
}
