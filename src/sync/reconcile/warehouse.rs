use super::{plan_pull, ReconcileReport, ReconciliationEngine};
use crate::remote::payload::parse_warehouse_item;
use crate::remote::{Collection, ListQuery, ServerUrl};
use crate::sync::error::SyncError;

impl ReconciliationEngine {
    /// Flat pull of the whole warehouse. Nothing is pushed.
    pub async fn sync_warehouse(&self, base: &ServerUrl) -> Result<ReconcileReport, SyncError> {
        let repo = self.store.warehouse();

        let listing = self
            .gateway()
            .list(base, Collection::WarehouseItems, &ListQuery::default())
            .await?;
        let complete = !listing.has_more();
        let parsed = listing.items.iter().map(parse_warehouse_item).collect();
        let plan = plan_pull(&repo.list().await?, parsed, complete);

        let mut report = ReconcileReport {
            skipped_unsynced: plan.skipped_unsynced,
            placeholders: plan.placeholders,
            ..ReconcileReport::default()
        };
        for item in &plan.upserts {
            if repo.upsert_remote(item).await? {
                report.pulled += 1;
            } else {
                report.skipped_unsynced += 1;
            }
        }
        report.pruned = repo.delete_by_ids(&plan.prune).await? as usize;

        tracing::debug!("Warehouse reconciled: {:?}", report);
        Ok(report)
    }
}
