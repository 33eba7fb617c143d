use super::{fetch_all, plan_pull, ReconcileReport, ReconciliationEngine};
use crate::remote::payload::parse_transaction;
use crate::remote::{Collection, ServerUrl};
use crate::sync::error::SyncError;

impl ReconciliationEngine {
    /// Paginated pull of the cash journal. Nothing is pushed.
    pub async fn sync_transactions(&self, base: &ServerUrl) -> Result<ReconcileReport, SyncError> {
        let repo = self.store.transactions();

        let (items, complete) =
            fetch_all(self.gateway(), base, Collection::Transactions, self.page_size).await?;
        let parsed = items.iter().map(parse_transaction).collect();
        let plan = plan_pull(&repo.list().await?, parsed, complete);

        let mut report = ReconcileReport {
            skipped_unsynced: plan.skipped_unsynced,
            placeholders: plan.placeholders,
            ..ReconcileReport::default()
        };
        if plan.dropped > 0 {
            tracing::warn!("Ignored {} transaction(s) without an id", plan.dropped);
        }
        for transaction in &plan.upserts {
            if repo.upsert_remote(transaction).await? {
                report.pulled += 1;
            } else {
                report.skipped_unsynced += 1;
            }
        }
        report.pruned = repo.delete_by_ids(&plan.prune).await? as usize;

        tracing::debug!("Transactions reconciled: {:?}", report);
        Ok(report)
    }
}
