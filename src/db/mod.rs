//! Local persistent store.
//!
//! One sqlite table per synchronised entity plus a key-value preference
//! table. Repositories are thin, cloneable handles over a shared pool.

mod changes;
mod preferences;
mod repair_repo;
mod transaction_repo;
mod warehouse_repo;

pub use changes::{ChangeFeed, LiveQuery, Table};
pub use preferences::{PreferenceStore, DEVICE_ID_KEY, SERVER_URL_KEY};
pub use repair_repo::RepairRepository;
pub use transaction_repo::TransactionRepository;
pub use warehouse_repo::WarehouseRepository;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Errors from the local store.
#[derive(Debug)]
pub enum StoreError {
    /// Failed to create the database directory.
    Io(PathBuf, std::io::Error),
    /// SQLite error.
    Database(sqlx::Error),
    /// Migration failure.
    Migration(sqlx::migrate::MigrateError),
    /// Row not found.
    NotFound(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(path, e) => {
                write!(f, "Failed to create database directory '{}': {}", path.display(), e)
            }
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Migration(e) => write!(f, "Migration error: {}", e),
            StoreError::NotFound(what) => write!(f, "Not found: {}", what),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(_, e) => Some(e),
            StoreError::Database(e) => Some(e),
            StoreError::Migration(e) => Some(e),
            StoreError::NotFound(_) => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        StoreError::Migration(e)
    }
}

/// Initialize the database connection pool and run migrations
pub async fn init_db(path: &Path) -> Result<SqlitePool, StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Io(parent.to_path_buf(), e))?;
        }
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Handle bundling the pool, the change feed and the per-table repositories.
#[derive(Debug, Clone)]
pub struct LocalStore {
    pool: SqlitePool,
    changes: ChangeFeed,
}

impl LocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            changes: ChangeFeed::new(),
        }
    }

    /// Opens (creating if needed) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self::new(init_db(path).await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn changes(&self) -> &ChangeFeed {
        &self.changes
    }

    pub fn repairs(&self) -> RepairRepository {
        RepairRepository::new(self.pool.clone(), self.changes.clone())
    }

    pub fn warehouse(&self) -> WarehouseRepository {
        WarehouseRepository::new(self.pool.clone(), self.changes.clone())
    }

    pub fn transactions(&self) -> TransactionRepository {
        TransactionRepository::new(self.pool.clone(), self.changes.clone())
    }

    pub fn preferences(&self) -> PreferenceStore {
        PreferenceStore::new(self.pool.clone(), self.changes.clone())
    }
}

pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Builds `?, ?, ?` for an `IN (...)` clause.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
