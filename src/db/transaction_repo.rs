use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::str::FromStr;

use super::changes::{ChangeFeed, LiveQuery, Table};
use super::{parse_timestamp, placeholders, StoreError};
use crate::models::{Transaction, TransactionKind};

const TRANSACTION_COLUMNS: &str = "id, remote_id, kind, amount, description, category, \
     repair_receipt, occurred_at, last_modified, synced";

#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
    changes: ChangeFeed,
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    remote_id: Option<i64>,
    kind: String,
    amount: f64,
    description: String,
    category: String,
    repair_receipt: Option<i64>,
    occurred_at: String,
    last_modified: String,
    synced: bool,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Transaction {
            id: row.id,
            remote_id: row.remote_id,
            kind: TransactionKind::from_str(&row.kind).unwrap_or(TransactionKind::Income),
            amount: row.amount,
            description: row.description,
            category: row.category,
            repair_receipt: row.repair_receipt,
            occurred_at: parse_timestamp(&row.occurred_at),
            last_modified: parse_timestamp(&row.last_modified),
            synced: row.synced,
        }
    }
}

impl TransactionRepository {
    pub fn new(pool: SqlitePool, changes: ChangeFeed) -> Self {
        Self { pool, changes }
    }

    pub async fn list(&self) -> Result<Vec<Transaction>, StoreError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions ORDER BY occurred_at DESC, id DESC",
            TRANSACTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Transaction::from).collect())
    }

    pub fn watch_all(&self) -> LiveQuery<Vec<Transaction>> {
        let repo = self.clone();
        LiveQuery::new(Table::Transactions, &self.changes, move || {
            let repo = repo.clone();
            Box::pin(async move { repo.list().await })
        })
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Transaction>, StoreError> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions WHERE id = ?",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Transaction::from))
    }

    pub async fn get_by_remote_id(&self, remote_id: i64) -> Result<Option<Transaction>, StoreError> {
        let row: Option<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions WHERE remote_id = ?",
            TRANSACTION_COLUMNS
        ))
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Transaction::from))
    }

    pub async fn list_unsynced(&self) -> Result<Vec<Transaction>, StoreError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM transactions WHERE synced = 0 ORDER BY id",
            TRANSACTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Transaction::from).collect())
    }

    /// Cash balance over a time window (inclusive start, exclusive end).
    pub async fn balance_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<f64, StoreError> {
        let (balance,): (Option<f64>,) = sqlx::query_as(
            r#"
            SELECT SUM(CASE WHEN kind = 'expense' THEN -amount ELSE amount END)
            FROM transactions
            WHERE occurred_at >= ? AND occurred_at < ?
            "#,
        )
        .bind(from.to_rfc3339())
        .bind(to.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        Ok(balance.unwrap_or(0.0))
    }

    pub async fn insert_local(&self, transaction: &Transaction) -> Result<Transaction, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions (remote_id, kind, amount, description, category,
                repair_receipt, occurred_at, last_modified, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(transaction.remote_id)
        .bind(transaction.kind.to_string())
        .bind(transaction.amount)
        .bind(&transaction.description)
        .bind(&transaction.category)
        .bind(transaction.repair_receipt)
        .bind(transaction.occurred_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.changes.notify(Table::Transactions);

        let id = result.last_insert_rowid();
        self.get_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", id)))
    }

    /// Writes the remote version of a transaction unless the local row is unsynced.
    pub async fn upsert_remote(&self, transaction: &Transaction) -> Result<bool, StoreError> {
        let Some(remote_id) = transaction.remote_id else {
            return Ok(false);
        };

        let result = sqlx::query(
            r#"
            INSERT INTO transactions (remote_id, kind, amount, description, category,
                repair_receipt, occurred_at, last_modified, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT(remote_id) DO UPDATE SET
                kind = excluded.kind,
                amount = excluded.amount,
                description = excluded.description,
                category = excluded.category,
                repair_receipt = excluded.repair_receipt,
                occurred_at = excluded.occurred_at,
                last_modified = excluded.last_modified,
                synced = 1
            WHERE transactions.synced = 1
            "#,
        )
        .bind(remote_id)
        .bind(transaction.kind.to_string())
        .bind(transaction.amount)
        .bind(&transaction.description)
        .bind(&transaction.category)
        .bind(transaction.repair_receipt)
        .bind(transaction.occurred_at.to_rfc3339())
        .bind(transaction.last_modified.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let written = result.rows_affected() > 0;
        if written {
            self.changes.notify(Table::Transactions);
        }
        Ok(written)
    }

    pub async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM transactions WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let result = query.execute(&self.pool).await?;
        self.changes.notify(Table::Transactions);
        Ok(result.rows_affected())
    }

    pub async fn delete_all(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM transactions")
            .execute(&self.pool)
            .await?;
        self.changes.notify(Table::Transactions);
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalStore;
    use chrono::Duration;
    use tempfile::TempDir;

    async fn setup() -> (TransactionRepository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::open(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        (store.transactions(), temp_dir)
    }

    #[tokio::test]
    async fn test_balance_between() {
        let (repo, _temp) = setup().await;
        let now = Utc::now();

        repo.insert_local(&Transaction::new(TransactionKind::Income, 100.0, "Repair #1"))
            .await
            .unwrap();
        repo.insert_local(&Transaction::new(TransactionKind::Expense, 30.0, "Parts"))
            .await
            .unwrap();

        let balance = repo
            .balance_between(now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(balance, 70.0);
    }

    #[tokio::test]
    async fn test_upsert_remote_round_trips_kind() {
        let (repo, _temp) = setup().await;
        let mut remote = Transaction::new(TransactionKind::Expense, 12.5, "Solder");
        remote.remote_id = Some(4);

        assert!(repo.upsert_remote(&remote).await.unwrap());

        let all = repo.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].kind, TransactionKind::Expense);
        assert!(all[0].synced);
    }
}
