use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::changes::{ChangeFeed, LiveQuery, Table};
use super::{parse_timestamp, placeholders, StoreError};
use crate::models::Repair;

const REPAIR_COLUMNS: &str = "id, remote_id, receipt_number, client_name, client_phone, device, \
     problem, status, executor, cost, prepayment, urgent, created_at, last_modified, synced";

#[derive(Debug, Clone)]
pub struct RepairRepository {
    pool: SqlitePool,
    changes: ChangeFeed,
}

#[derive(sqlx::FromRow)]
struct RepairRow {
    id: i64,
    remote_id: Option<i64>,
    receipt_number: i64,
    client_name: String,
    client_phone: String,
    device: String,
    problem: String,
    status: String,
    executor: String,
    cost: f64,
    prepayment: f64,
    urgent: bool,
    created_at: String,
    last_modified: String,
    synced: bool,
}

impl From<RepairRow> for Repair {
    fn from(row: RepairRow) -> Self {
        Repair {
            id: row.id,
            remote_id: row.remote_id,
            receipt_number: row.receipt_number,
            client_name: row.client_name,
            client_phone: row.client_phone,
            device: row.device,
            problem: row.problem,
            status: row.status,
            executor: row.executor,
            cost: row.cost,
            prepayment: row.prepayment,
            urgent: row.urgent,
            created_at: parse_timestamp(&row.created_at),
            last_modified: parse_timestamp(&row.last_modified),
            synced: row.synced,
        }
    }
}

impl RepairRepository {
    pub fn new(pool: SqlitePool, changes: ChangeFeed) -> Self {
        Self { pool, changes }
    }

    pub async fn list(&self) -> Result<Vec<Repair>, StoreError> {
        let rows: Vec<RepairRow> = sqlx::query_as(&format!(
            "SELECT {} FROM repairs ORDER BY receipt_number DESC, id DESC",
            REPAIR_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Repair::from).collect())
    }

    /// Live view over all repairs, refreshed on every write to the table.
    pub fn watch_all(&self) -> LiveQuery<Vec<Repair>> {
        let repo = self.clone();
        LiveQuery::new(Table::Repairs, &self.changes, move || {
            let repo = repo.clone();
            Box::pin(async move { repo.list().await })
        })
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Repair>, StoreError> {
        let row: Option<RepairRow> = sqlx::query_as(&format!(
            "SELECT {} FROM repairs WHERE id = ?",
            REPAIR_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Repair::from))
    }

    pub async fn get_by_remote_id(&self, remote_id: i64) -> Result<Option<Repair>, StoreError> {
        let row: Option<RepairRow> = sqlx::query_as(&format!(
            "SELECT {} FROM repairs WHERE remote_id = ?",
            REPAIR_COLUMNS
        ))
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Repair::from))
    }

    pub async fn find_by_receipt(&self, receipt_number: i64) -> Result<Vec<Repair>, StoreError> {
        let rows: Vec<RepairRow> = sqlx::query_as(&format!(
            "SELECT {} FROM repairs WHERE receipt_number = ? ORDER BY id",
            REPAIR_COLUMNS
        ))
        .bind(receipt_number)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Repair::from).collect())
    }

    pub async fn list_unsynced(&self) -> Result<Vec<Repair>, StoreError> {
        let rows: Vec<RepairRow> = sqlx::query_as(&format!(
            "SELECT {} FROM repairs WHERE synced = 0 ORDER BY id",
            REPAIR_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Repair::from).collect())
    }

    pub async fn next_receipt_number(&self) -> Result<i64, StoreError> {
        let (max,): (Option<i64>,) = sqlx::query_as("SELECT MAX(receipt_number) FROM repairs")
            .fetch_one(&self.pool)
            .await?;
        Ok(max.unwrap_or(0) + 1)
    }

    /// Inserts a locally created repair. The row starts unsynced.
    pub async fn insert_local(&self, repair: &Repair) -> Result<Repair, StoreError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO repairs (remote_id, receipt_number, client_name, client_phone, device,
                problem, status, executor, cost, prepayment, urgent, created_at, last_modified, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(repair.remote_id)
        .bind(repair.receipt_number)
        .bind(&repair.client_name)
        .bind(&repair.client_phone)
        .bind(&repair.device)
        .bind(&repair.problem)
        .bind(&repair.status)
        .bind(&repair.executor)
        .bind(repair.cost)
        .bind(repair.prepayment)
        .bind(repair.urgent)
        .bind(repair.created_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.changes.notify(Table::Repairs);

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("repair {}", id)))
    }

    /// Saves a local edit. The row becomes unsynced until the next push.
    pub async fn update_local(&self, repair: &Repair) -> Result<Repair, StoreError> {
        sqlx::query(
            r#"
            UPDATE repairs
            SET receipt_number = ?, client_name = ?, client_phone = ?, device = ?, problem = ?,
                status = ?, executor = ?, cost = ?, prepayment = ?, urgent = ?,
                last_modified = ?, synced = 0
            WHERE id = ?
            "#,
        )
        .bind(repair.receipt_number)
        .bind(&repair.client_name)
        .bind(&repair.client_phone)
        .bind(&repair.device)
        .bind(&repair.problem)
        .bind(&repair.status)
        .bind(&repair.executor)
        .bind(repair.cost)
        .bind(repair.prepayment)
        .bind(repair.urgent)
        .bind(Utc::now().to_rfc3339())
        .bind(repair.id)
        .execute(&self.pool)
        .await?;

        self.changes.notify(Table::Repairs);

        self.get_by_id(repair.id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("repair {}", repair.id)))
    }

    /// Writes the remote version of a repair, keyed by its remote id.
    ///
    /// A matching row that is still unsynced is left untouched. Returns
    /// whether a row was written.
    pub async fn upsert_remote(&self, repair: &Repair) -> Result<bool, StoreError> {
        let Some(remote_id) = repair.remote_id else {
            return Ok(false);
        };

        let result = sqlx::query(
            r#"
            INSERT INTO repairs (remote_id, receipt_number, client_name, client_phone, device,
                problem, status, executor, cost, prepayment, urgent, created_at, last_modified, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT(remote_id) DO UPDATE SET
                receipt_number = excluded.receipt_number,
                client_name = excluded.client_name,
                client_phone = excluded.client_phone,
                device = excluded.device,
                problem = excluded.problem,
                status = excluded.status,
                executor = excluded.executor,
                cost = excluded.cost,
                prepayment = excluded.prepayment,
                urgent = excluded.urgent,
                created_at = excluded.created_at,
                last_modified = excluded.last_modified,
                synced = 1
            WHERE repairs.synced = 1
            "#,
        )
        .bind(remote_id)
        .bind(repair.receipt_number)
        .bind(&repair.client_name)
        .bind(&repair.client_phone)
        .bind(&repair.device)
        .bind(&repair.problem)
        .bind(&repair.status)
        .bind(&repair.executor)
        .bind(repair.cost)
        .bind(repair.prepayment)
        .bind(repair.urgent)
        .bind(repair.created_at.to_rfc3339())
        .bind(repair.last_modified.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let written = result.rows_affected() > 0;
        if written {
            self.changes.notify(Table::Repairs);
        }
        Ok(written)
    }

    /// Records a confirmed push: the row adopts the remote id, and becomes
    /// synced only if it still carries the `pushed_version` timestamp that was
    /// sent. An edit saved while the push was in flight keeps the row unsynced.
    ///
    /// Any other row already mirroring that remote id is a stale copy of the
    /// same ticket and is removed. Returns whether the row is now synced; a row
    /// deleted in the meantime yields `false`.
    pub async fn mark_synced(
        &self,
        id: i64,
        remote_id: i64,
        pushed_version: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM repairs WHERE remote_id = ? AND id != ? AND synced = 1")
            .bind(remote_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r#"
            UPDATE repairs
            SET remote_id = ?, synced = CASE WHEN last_modified = ? THEN 1 ELSE synced END
            WHERE id = ?
            "#,
        )
        .bind(remote_id)
        .bind(pushed_version.to_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            // Deleted locally while the push was in flight; dropping `tx` rolls back.
            return Ok(false);
        }

        let (synced,): (bool,) = sqlx::query_as("SELECT synced FROM repairs WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        self.changes.notify(Table::Repairs);
        Ok(synced)
    }

    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.delete_by_ids(&[id]).await.map(|_| ())
    }

    pub async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!("DELETE FROM repairs WHERE id IN ({})", placeholders(ids.len()));
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let result = query.execute(&self.pool).await?;
        self.changes.notify(Table::Repairs);
        Ok(result.rows_affected())
    }

    pub async fn delete_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM repairs")
            .execute(&self.pool)
            .await?;
        self.changes.notify(Table::Repairs);
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalStore;
    use crate::models::RepairStatus;
    use tempfile::TempDir;

    async fn setup() -> (RepairRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::open(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        (store.repairs(), temp_dir)
    }

    fn remote_repair(remote_id: i64, receipt: i64, client: &str) -> Repair {
        let mut repair = Repair::new(receipt, client, "Galaxy S21");
        repair.remote_id = Some(remote_id);
        repair.synced = true;
        repair
    }

    #[tokio::test]
    async fn test_insert_local_starts_unsynced() {
        let (repo, _temp) = setup().await;

        let created = repo
            .insert_local(&Repair::new(1, "Ann", "Pixel 6").with_problem("Cracked screen"))
            .await
            .unwrap();

        assert!(created.id > 0);
        assert!(!created.synced);
        assert_eq!(created.problem, "Cracked screen");
        assert_eq!(repo.list_unsynced().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_next_receipt_number() {
        let (repo, _temp) = setup().await;
        assert_eq!(repo.next_receipt_number().await.unwrap(), 1);

        repo.insert_local(&Repair::new(41, "Ann", "Pixel 6"))
            .await
            .unwrap();
        assert_eq!(repo.next_receipt_number().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_upsert_remote_inserts_and_updates() {
        let (repo, _temp) = setup().await;

        assert!(repo.upsert_remote(&remote_repair(10, 5, "Ann")).await.unwrap());
        assert!(repo.upsert_remote(&remote_repair(10, 5, "Anna")).await.unwrap());

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].client_name, "Anna");
        assert!(all[0].synced);
    }

    #[tokio::test]
    async fn test_upsert_remote_skips_unsynced_row() {
        let (repo, _temp) = setup().await;

        repo.upsert_remote(&remote_repair(10, 5, "Ann")).await.unwrap();
        let mut local = repo.get_by_remote_id(10).await.unwrap().unwrap();
        local.status = RepairStatus::Ready.label().to_string();
        repo.update_local(&local).await.unwrap();

        let written = repo.upsert_remote(&remote_repair(10, 5, "Server")).await.unwrap();
        assert!(!written);

        let kept = repo.get_by_remote_id(10).await.unwrap().unwrap();
        assert_eq!(kept.client_name, "Ann");
        assert_eq!(kept.status, "Ready for pickup");
        assert!(!kept.synced);
    }

    #[tokio::test]
    async fn test_mark_synced_adopts_remote_id() {
        let (repo, _temp) = setup().await;
        let local = repo
            .insert_local(&Repair::new(7, "Ann", "Pixel 6"))
            .await
            .unwrap();

        assert!(repo.mark_synced(local.id, 500, local.last_modified).await.unwrap());

        let synced = repo.get_by_id(local.id).await.unwrap().unwrap();
        assert!(synced.synced);
        assert_eq!(synced.remote_id, Some(500));
    }

    #[tokio::test]
    async fn test_mark_synced_keeps_newer_edit_unsynced() {
        let (repo, _temp) = setup().await;
        let pushed = repo
            .insert_local(&Repair::new(7, "Ann", "Pixel 6").with_problem("Old problem"))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let mut edited = pushed.clone();
        edited.problem = "Edited while pushing".to_string();
        repo.update_local(&edited).await.unwrap();

        let synced = repo
            .mark_synced(pushed.id, 500, pushed.last_modified)
            .await
            .unwrap();

        assert!(!synced);
        let row = repo.get_by_id(pushed.id).await.unwrap().unwrap();
        assert!(!row.synced);
        assert_eq!(row.remote_id, Some(500));
        assert_eq!(row.problem, "Edited while pushing");
    }

    #[tokio::test]
    async fn test_mark_synced_replaces_stale_mirror() {
        let (repo, _temp) = setup().await;
        repo.upsert_remote(&remote_repair(500, 7, "Ann")).await.unwrap();
        let local = repo
            .insert_local(&Repair::new(7, "Ann", "Pixel 6"))
            .await
            .unwrap();

        repo.mark_synced(local.id, 500, local.last_modified).await.unwrap();

        let rows = repo.find_by_receipt(7).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, local.id);
    }

    #[tokio::test]
    async fn test_delete_by_ids() {
        let (repo, _temp) = setup().await;
        let a = repo.insert_local(&Repair::new(1, "A", "X")).await.unwrap();
        let b = repo.insert_local(&Repair::new(2, "B", "Y")).await.unwrap();
        repo.insert_local(&Repair::new(3, "C", "Z")).await.unwrap();

        assert_eq!(repo.delete_by_ids(&[a.id, b.id]).await.unwrap(), 2);
        assert_eq!(repo.list().await.unwrap().len(), 1);
        assert_eq!(repo.delete_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_watch_all_refreshes_on_write() {
        let (repo, _temp) = setup().await;
        let mut live = repo.watch_all();

        let initial = live.next().await.unwrap().unwrap();
        assert!(initial.is_empty());

        repo.insert_local(&Repair::new(1, "Ann", "Pixel 6"))
            .await
            .unwrap();

        let refreshed = live.next().await.unwrap().unwrap();
        assert_eq!(refreshed.len(), 1);
    }
}
