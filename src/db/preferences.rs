//! Key-value preference store.
//!
//! Holds the configured remote base URL and this device's identity. The
//! orchestrator reads the URL on every sync attempt, so a change takes effect
//! on the next trigger.

use sqlx::SqlitePool;
use uuid::Uuid;

use super::changes::{ChangeFeed, Table};
use super::StoreError;
use crate::remote::ServerUrl;

pub const SERVER_URL_KEY: &str = "server_url";
pub const DEVICE_ID_KEY: &str = "device_id";

#[derive(Debug, Clone)]
pub struct PreferenceStore {
    pool: SqlitePool,
    changes: ChangeFeed,
}

impl PreferenceStore {
    pub fn new(pool: SqlitePool, changes: ChangeFeed) -> Self {
        Self { pool, changes }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.0))
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO preferences (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        self.changes.notify(Table::Preferences);
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM preferences WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        self.changes.notify(Table::Preferences);
        Ok(())
    }

    /// The remote base URL, or `None` when sync is not configured.
    pub async fn server_url(&self) -> Result<Option<ServerUrl>, StoreError> {
        Ok(self
            .get(SERVER_URL_KEY)
            .await?
            .and_then(|raw| ServerUrl::parse(&raw)))
    }

    /// Stores a normalized URL. An empty value clears it.
    pub async fn set_server_url(&self, raw: &str) -> Result<Option<ServerUrl>, StoreError> {
        match ServerUrl::parse(raw) {
            Some(url) => {
                self.set(SERVER_URL_KEY, url.as_str()).await?;
                Ok(Some(url))
            }
            None => {
                self.remove(SERVER_URL_KEY).await?;
                Ok(None)
            }
        }
    }

    /// Stores `seed` only if no URL has been configured yet.
    pub async fn seed_server_url(&self, seed: &str) -> Result<(), StoreError> {
        if self.get(SERVER_URL_KEY).await?.is_none() {
            self.set_server_url(seed).await?;
        }
        Ok(())
    }

    /// This device's identity for lock ownership, generated on first use.
    pub async fn device_id(&self) -> Result<String, StoreError> {
        if let Some(id) = self.get(DEVICE_ID_KEY).await? {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        self.set(DEVICE_ID_KEY, &id).await?;
        Ok(id)
    }
}
