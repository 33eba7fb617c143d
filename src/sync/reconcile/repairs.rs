use super::{fetch_all, plan_pull, ReconcileReport, ReconciliationEngine};
use crate::models::Repair;
use crate::remote::payload::{parse_repair, remote_id_of, repair_payload};
use crate::remote::{Collection, ListQuery, RemoteError, ServerUrl};
use crate::sync::error::SyncError;

/// Result of pushing one unsynced repair.
#[derive(Debug)]
pub enum PushResult {
    /// The remote confirmed the repair; the local row is now synced.
    Pushed { remote_id: i64 },
    /// The server refused this record. The row stays unsynced.
    Rejected(RemoteError),
}

/// Client-side rejections are per record; everything else aborts the phase.
fn is_record_rejection(error: &RemoteError) -> bool {
    matches!(error, RemoteError::Server { status, .. } if (400..500).contains(status))
        || matches!(error, RemoteError::Conflict(_))
}

impl ReconciliationEngine {
    /// Pulls every repair page, then pushes the local unsynced rows.
    pub async fn sync_repairs(&self, base: &ServerUrl) -> Result<ReconcileReport, SyncError> {
        let repo = self.store.repairs();

        let (items, complete) =
            fetch_all(self.gateway(), base, Collection::Repairs, self.page_size).await?;
        let parsed = items.iter().map(parse_repair).collect();
        let local = repo.list().await?;
        let plan = plan_pull(&local, parsed, complete);

        let mut report = ReconcileReport {
            skipped_unsynced: plan.skipped_unsynced,
            placeholders: plan.placeholders,
            ..ReconcileReport::default()
        };
        if plan.dropped > 0 {
            tracing::warn!("Ignored {} repair record(s) without an id", plan.dropped);
        }

        for repair in &plan.upserts {
            if repo.upsert_remote(repair).await? {
                report.pulled += 1;
            } else {
                // Edited locally while the pull was running.
                report.skipped_unsynced += 1;
            }
        }
        report.pruned = repo.delete_by_ids(&plan.prune).await? as usize;

        for repair in repo.list_unsynced().await? {
            match self.push_repair(base, &repair).await? {
                PushResult::Pushed { .. } => report.pushed += 1,
                PushResult::Rejected(e) => {
                    tracing::warn!(
                        "Server rejected repair #{}: {}",
                        repair.receipt_number,
                        e
                    );
                    report.push_rejected += 1;
                }
            }
        }

        tracing::debug!("Repairs reconciled: {:?}", report);
        Ok(report)
    }

    /// Creates or updates one repair remotely, keyed by receipt number when
    /// it has no remote id yet.
    pub async fn push_repair(
        &self,
        base: &ServerUrl,
        repair: &Repair,
    ) -> Result<PushResult, SyncError> {
        let body = repair_payload(repair);

        let target = match repair.remote_id {
            Some(id) => Some(id),
            None => self.find_remote_by_receipt(base, repair.receipt_number).await?,
        };

        let stored = match target {
            Some(id) => match self
                .gateway()
                .update(base, Collection::Repairs, id, &body)
                .await
            {
                Ok(stored) => Ok(stored),
                // Deleted remotely since the last pull; recreate it.
                Err(RemoteError::Server { status: 404, .. }) => {
                    self.gateway().create(base, Collection::Repairs, &body).await
                }
                Err(e) => Err(e),
            },
            None => self.gateway().create(base, Collection::Repairs, &body).await,
        };

        let stored = match stored {
            Ok(stored) => stored,
            Err(e) if is_record_rejection(&e) => return Ok(PushResult::Rejected(e)),
            Err(e) => return Err(e.into()),
        };

        let remote_id = remote_id_of(&stored)
            .or(target)
            .ok_or_else(|| SyncError::Decode("server did not return a repair id".to_string()))?;

        let synced = self
            .store
            .repairs()
            .mark_synced(repair.id, remote_id, repair.last_modified)
            .await?;
        if synced {
            tracing::info!(
                "Pushed repair #{} (remote id {})",
                repair.receipt_number,
                remote_id
            );
        } else {
            tracing::info!(
                "Pushed repair #{} (remote id {}); edited meanwhile, stays unsynced",
                repair.receipt_number,
                remote_id
            );
        }
        Ok(PushResult::Pushed { remote_id })
    }

    async fn find_remote_by_receipt(
        &self,
        base: &ServerUrl,
        receipt_number: i64,
    ) -> Result<Option<i64>, SyncError> {
        let listing = self
            .gateway()
            .list(base, Collection::Repairs, &ListQuery::by_receipt(receipt_number))
            .await?;

        // Servers that ignore the filter return everything; match here too.
        Ok(listing.items.iter().find_map(|item| {
            let parsed = parse_repair(item);
            (parsed.record.receipt_number == receipt_number)
                .then_some(parsed.record.remote_id)
                .flatten()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LocalStore;
    use crate::models::RepairStatus;
    use crate::remote::fake::FakeGateway;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn setup() -> (ReconciliationEngine, Arc<FakeGateway>, ServerUrl, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::open(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        let gateway = FakeGateway::new();
        let engine = ReconciliationEngine::new(store, gateway.clone(), 2);
        let base = ServerUrl::parse("http://shop.local").unwrap();
        (engine, gateway, base, temp_dir)
    }

    fn remote_repair(receipt: i64, client: &str, status: &str) -> serde_json::Value {
        json!({
            "receipt_number": receipt,
            "client_name": client,
            "device": "Pixel 6",
            "status": status,
        })
    }

    #[tokio::test]
    async fn test_pull_across_pages() {
        let (engine, gateway, base, _temp) = setup().await;
        gateway.seed(
            Collection::Repairs,
            (1..=5).map(|n| remote_repair(n, "Ann", "ready")).collect(),
        );

        let report = engine.sync_repairs(&base).await.unwrap();

        assert_eq!(report.pulled, 5);
        let local = engine.store().repairs().list().await.unwrap();
        assert_eq!(local.len(), 5);
        assert!(local.iter().all(|r| r.synced));
        assert!(local.iter().all(|r| r.status == "Ready for pickup"));
    }

    #[tokio::test]
    async fn test_unsynced_replay() {
        let (engine, gateway, base, _temp) = setup().await;
        let repo = engine.store().repairs();

        // Pad the local table so the new ticket lands on local id 77.
        for n in 1..=76 {
            let row = repo.insert_local(&Repair::new(1000 + n, "Pad", "X")).await.unwrap();
            repo.delete(row.id).await.unwrap();
        }
        let local = repo
            .insert_local(&Repair::new(77, "Walk-in", "iPad").with_problem("Dead battery"))
            .await
            .unwrap();
        assert_eq!(local.id, 77);

        // The remote has a different ticket that would land on id 77.
        for n in 1..=77 {
            gateway.seed(Collection::Repairs, vec![remote_repair(500 + n, "Remote", "queued")]);
        }
        assert!(gateway.store.get(Collection::Repairs, 77).is_some());

        let report = engine.sync_repairs(&base).await.unwrap();
        assert_eq!(report.pushed, 1);

        let row = repo.get_by_id(77).await.unwrap().unwrap();
        assert_eq!(row.client_name, "Walk-in");
        assert_eq!(row.problem, "Dead battery");
        assert!(row.synced);

        let remote_id = row.remote_id.unwrap();
        assert_ne!(remote_id, 77);
        let remote = gateway.store.get(Collection::Repairs, remote_id).unwrap();
        assert_eq!(remote["receipt_number"], json!(77));
        assert_eq!(remote["client_name"], json!("Walk-in"));
    }

    #[tokio::test]
    async fn test_push_updates_existing_receipt() {
        let (engine, gateway, base, _temp) = setup().await;
        gateway.seed(Collection::Repairs, vec![remote_repair(77, "Ann", "queued")]);
        let repo = engine.store().repairs();
        let local = repo
            .insert_local(&Repair::new(77, "Ann", "Pixel 6").with_status(RepairStatus::Ready))
            .await
            .unwrap();

        let report = engine.sync_repairs(&base).await.unwrap();

        assert_eq!(report.skipped_unsynced, 1);
        assert_eq!(report.pushed, 1);
        assert_eq!(gateway.store.count(Collection::Repairs), 1);
        let remote = gateway.store.get(Collection::Repairs, 1).unwrap();
        assert_eq!(remote["status"], json!("ready"));

        let rows = repo.find_by_receipt(77).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, local.id);
        assert_eq!(rows[0].remote_id, Some(1));
    }

    #[tokio::test]
    async fn test_pull_prunes_remotely_deleted() {
        let (engine, gateway, base, _temp) = setup().await;
        gateway.seed(
            Collection::Repairs,
            vec![remote_repair(1, "Ann", "queued"), remote_repair(2, "Bob", "queued")],
        );
        engine.sync_repairs(&base).await.unwrap();

        gateway.store.delete(Collection::Repairs, 2).unwrap();
        let report = engine.sync_repairs(&base).await.unwrap();

        assert_eq!(report.pruned, 1);
        assert_eq!(engine.store().repairs().list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_network_failure_escalates_and_keeps_row() {
        let (engine, gateway, base, _temp) = setup().await;
        let repo = engine.store().repairs();
        repo.insert_local(&Repair::new(5, "Ann", "Pixel 6")).await.unwrap();
        gateway.fail_collection(
            Collection::Repairs,
            RemoteError::Network("timed out".to_string()),
        );

        let result = engine.sync_repairs(&base).await;

        assert!(matches!(result, Err(SyncError::Network(_))));
        assert_eq!(repo.list_unsynced().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_during_push_is_not_lost() {
        let (engine, gateway, base, _temp) = setup().await;
        let repo = engine.store().repairs();
        let local = repo
            .insert_local(&Repair::new(12, "Ann", "Pixel 6").with_problem("Old problem"))
            .await
            .unwrap();
        gateway.set_delay(Duration::from_millis(200));

        let push = engine.push_repair(&base, &local);
        let edit = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let mut edited = local.clone();
            edited.problem = "Edited while pushing".to_string();
            repo.update_local(&edited).await.unwrap();
        };
        let (pushed, ()) = tokio::join!(push, edit);
        let remote_id = match pushed.unwrap() {
            PushResult::Pushed { remote_id } => remote_id,
            other => panic!("expected a push, got {:?}", other),
        };

        let row = repo.get_by_id(local.id).await.unwrap().unwrap();
        assert!(!row.synced);
        assert_eq!(row.remote_id, Some(remote_id));
        let remote = gateway.store.get(Collection::Repairs, remote_id).unwrap();
        assert_eq!(remote["problem"], json!("Old problem"));

        // The next run pulls without clobbering the edit, then sends it.
        gateway.set_delay(Duration::ZERO);
        let report = engine.sync_repairs(&base).await.unwrap();
        assert_eq!(report.pushed, 1);
        let row = repo.get_by_id(local.id).await.unwrap().unwrap();
        assert!(row.synced);
        assert_eq!(row.problem, "Edited while pushing");
        let remote = gateway.store.get(Collection::Repairs, remote_id).unwrap();
        assert_eq!(remote["problem"], json!("Edited while pushing"));
        assert_eq!(gateway.store.count(Collection::Repairs), 1);
    }

    #[test]
    fn test_record_rejection_classification() {
        assert!(is_record_rejection(&RemoteError::Server {
            status: 422,
            message: String::new()
        }));
        assert!(!is_record_rejection(&RemoteError::Server {
            status: 500,
            message: String::new()
        }));
        assert!(!is_record_rejection(&RemoteError::Network("x".to_string())));
    }
}
