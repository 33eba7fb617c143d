use chrono::Utc;
use sqlx::SqlitePool;

use super::changes::{ChangeFeed, LiveQuery, Table};
use super::{parse_timestamp, placeholders, StoreError};
use crate::models::WarehouseItem;

const ITEM_COLUMNS: &str =
    "id, remote_id, name, sku, category, quantity, price, location, last_modified, synced";

#[derive(Debug, Clone)]
pub struct WarehouseRepository {
    pool: SqlitePool,
    changes: ChangeFeed,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: i64,
    remote_id: Option<i64>,
    name: String,
    sku: String,
    category: String,
    quantity: i64,
    price: f64,
    location: String,
    last_modified: String,
    synced: bool,
}

impl From<ItemRow> for WarehouseItem {
    fn from(row: ItemRow) -> Self {
        WarehouseItem {
            id: row.id,
            remote_id: row.remote_id,
            name: row.name,
            sku: row.sku,
            category: row.category,
            quantity: row.quantity,
            price: row.price,
            location: row.location,
            last_modified: parse_timestamp(&row.last_modified),
            synced: row.synced,
        }
    }
}

impl WarehouseRepository {
    pub fn new(pool: SqlitePool, changes: ChangeFeed) -> Self {
        Self { pool, changes }
    }

    pub async fn list(&self) -> Result<Vec<WarehouseItem>, StoreError> {
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM warehouse_items ORDER BY name, id",
            ITEM_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(WarehouseItem::from).collect())
    }

    pub fn watch_all(&self) -> LiveQuery<Vec<WarehouseItem>> {
        let repo = self.clone();
        LiveQuery::new(Table::WarehouseItems, &self.changes, move || {
            let repo = repo.clone();
            Box::pin(async move { repo.list().await })
        })
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<WarehouseItem>, StoreError> {
        let row: Option<ItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM warehouse_items WHERE id = ?",
            ITEM_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(WarehouseItem::from))
    }

    pub async fn get_by_remote_id(&self, remote_id: i64) -> Result<Option<WarehouseItem>, StoreError> {
        let row: Option<ItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM warehouse_items WHERE remote_id = ?",
            ITEM_COLUMNS
        ))
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(WarehouseItem::from))
    }

    pub async fn list_unsynced(&self) -> Result<Vec<WarehouseItem>, StoreError> {
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM warehouse_items WHERE synced = 0 ORDER BY id",
            ITEM_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(WarehouseItem::from).collect())
    }

    pub async fn search(&self, text: &str) -> Result<Vec<WarehouseItem>, StoreError> {
        let pattern = format!("%{}%", text);
        let rows: Vec<ItemRow> = sqlx::query_as(&format!(
            "SELECT {} FROM warehouse_items WHERE name LIKE ? OR sku LIKE ? ORDER BY name, id",
            ITEM_COLUMNS
        ))
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(WarehouseItem::from).collect())
    }

    pub async fn insert_local(&self, item: &WarehouseItem) -> Result<WarehouseItem, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO warehouse_items (remote_id, name, sku, category, quantity, price, location,
                last_modified, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(item.remote_id)
        .bind(&item.name)
        .bind(&item.sku)
        .bind(&item.category)
        .bind(item.quantity)
        .bind(item.price)
        .bind(&item.location)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.changes.notify(Table::WarehouseItems);

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("warehouse item {}", id)))
    }

    /// Writes the remote version of an item unless the local row is unsynced.
    pub async fn upsert_remote(&self, item: &WarehouseItem) -> Result<bool, StoreError> {
        let Some(remote_id) = item.remote_id else {
            return Ok(false);
        };

        let result = sqlx::query(
            r#"
            INSERT INTO warehouse_items (remote_id, name, sku, category, quantity, price, location,
                last_modified, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT(remote_id) DO UPDATE SET
                name = excluded.name,
                sku = excluded.sku,
                category = excluded.category,
                quantity = excluded.quantity,
                price = excluded.price,
                location = excluded.location,
                last_modified = excluded.last_modified,
                synced = 1
            WHERE warehouse_items.synced = 1
            "#,
        )
        .bind(remote_id)
        .bind(&item.name)
        .bind(&item.sku)
        .bind(&item.category)
        .bind(item.quantity)
        .bind(item.price)
        .bind(&item.location)
        .bind(item.last_modified.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let written = result.rows_affected() > 0;
        if written {
            self.changes.notify(Table::WarehouseItems);
        }
        Ok(written)
    }

    pub async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM warehouse_items WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let result = query.execute(&self.pool).await?;
        self.changes.notify(Table::WarehouseItems);
        Ok(result.rows_affected())
    }

    pub async fn delete_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM warehouse_items")
            .execute(&self.pool)
            .await?;
        self.changes.notify(Table::WarehouseItems);
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalStore;
    use tempfile::TempDir;

    async fn setup() -> (WarehouseRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::open(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        (store.warehouse(), temp_dir)
    }

    #[tokio::test]
    async fn test_upsert_remote_and_search() {
        let (repo, _temp) = setup().await;

        let mut item = WarehouseItem::new("iPhone 12 screen", "SCR-12").with_quantity(4);
        item.remote_id = Some(3);
        assert!(repo.upsert_remote(&item).await.unwrap());

        item.quantity = 2;
        assert!(repo.upsert_remote(&item).await.unwrap());

        let found = repo.search("SCR").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].quantity, 2);
        assert!(found[0].synced);
    }

    #[tokio::test]
    async fn test_local_row_not_overwritten() {
        let (repo, _temp) = setup().await;
        let mut local = WarehouseItem::new("Battery", "BAT-1");
        local.remote_id = Some(9);
        repo.insert_local(&local).await.unwrap();

        let mut remote = WarehouseItem::new("Battery v2", "BAT-1");
        remote.remote_id = Some(9);
        assert!(!repo.upsert_remote(&remote).await.unwrap());

        assert_eq!(repo.list().await.unwrap()[0].name, "Battery");
    }
}
