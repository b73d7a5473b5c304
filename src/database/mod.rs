//! Ambient database stack backing the `Repository` (C7) layer and the
//! `HealthProbe`'s database/backup checks.
//!
//! Trimmed down from a much larger database module: spatial indexing, query
//! optimization for geometric data, multi-region replication, and sharding
//! had no counterpart in this platform and were dropped in the final trim
//! (see DESIGN.md). `connection_pool`, `migrations`, and `backup` remain —
//! they back the `migrations` changelog collection (§6) and the backup-age
//! check in `HealthProbe` (§4.12).

use thiserror::Error;

/// Database error types.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Query execution error: {0}")]
    QueryExecution(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, DatabaseError>;

pub mod backup;
pub mod connection_pool;
pub mod migrations;

pub use backup::{BackupConfig, BackupManager, BackupType, RestorePoint};
pub use connection_pool::{ConnectionPool, DatabaseConfig, HealthCheck};
pub use migrations::{Migration, MigrationManager, MigrationVersion};

impl From<DatabaseError> for crate::error::AppError {
    fn from(err: DatabaseError) -> Self {
        crate::error::AppError::dependency_unavailable(err.to_string())
    }
}

/// Top-level database configuration, assembled from `PlatformConfig`.
#[derive(Debug, Clone)]
pub struct Config {
    pub primary_url: String,
    pub pool_config: connection_pool::DatabaseConfig,
    pub backup_config: backup::BackupConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary_url: "sqlite://aerosuite.db".to_string(),
            pool_config: connection_pool::DatabaseConfig::default(),
            backup_config: backup::BackupConfig::default(),
        }
    }
}

/// Groups the connection pool, migration runner, and backup manager that
/// `main.rs` assembles once at startup and hands to `HealthProbe` and the
/// migration CLI shim (`bin/migrate.rs`).
pub struct Database {
    pool: ConnectionPool,
    migrations: MigrationManager,
    backup: BackupManager,
}

impl Database {
    pub async fn new(config: Config) -> Result<Self> {
        let pool = ConnectionPool::new(config.pool_config.clone()).await?;
        let migrations = MigrationManager::new(pool.clone());
        migrations.init().await?;
        migrations::init_default_migrations(&migrations);
        let backup = BackupManager::new(config.backup_config)?;
        Ok(Self { pool, migrations, backup })
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn migrations(&self) -> &MigrationManager {
        &self.migrations
    }

    pub fn backup(&self) -> &BackupManager {
        &self.backup
    }

    /// Runs all migrations not present in the `migrations` changelog,
    /// idempotent relative to it (§6).
    pub async fn migrate(&self) -> Result<()> {
        self.migrations.run_pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn database_creation_succeeds_with_defaults() {
        let db = Database::new(Config::default()).await;
        assert!(db.is_ok());
    }
}
