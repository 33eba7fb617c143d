//! Per-entity reconciliation between the local store and the remote.
//!
//! Every reconciler pulls the remote collection and writes it over the
//! local synced rows. Rows still marked unsynced are never touched by a
//! pull: they are matched by remote id and by business key (the receipt
//! number for repairs) and skipped. Repairs are additionally pushed.

mod repairs;
mod transactions;
mod warehouse;

pub use repairs::PushResult;

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use super::error::SyncError;
use crate::db::LocalStore;
use crate::models::SyncableRecord;
use crate::remote::payload::Parsed;
use crate::remote::{Collection, ListQuery, RemoteGateway, ServerUrl};

/// Upper bound on pages fetched in one pull.
const MAX_PAGES: u32 = 1000;

/// Counts from reconciling one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub pulled: usize,
    pub skipped_unsynced: usize,
    pub pruned: usize,
    pub pushed: usize,
    pub push_rejected: usize,
    pub placeholders: usize,
}

/// What a pull should do to the local table.
#[derive(Debug, Clone, PartialEq)]
pub struct PullPlan<T> {
    pub upserts: Vec<T>,
    pub skipped_unsynced: usize,
    /// Local ids of synced rows the remote no longer has.
    pub prune: Vec<i64>,
    pub placeholders: usize,
    /// Records without a usable remote id.
    pub dropped: usize,
}

/// Decides how a remote listing applies to the local rows.
///
/// Pruning only happens when `complete` is true, since a partial listing
/// says nothing about the rows it did not include.
pub fn plan_pull<T: SyncableRecord>(local: &[T], remote: Vec<Parsed<T>>, complete: bool) -> PullPlan<T> {
    let unsynced_ids: HashSet<i64> = local
        .iter()
        .filter(|r| !r.is_synced())
        .filter_map(|r| r.remote_id())
        .collect();
    let unsynced_keys: HashSet<String> = local
        .iter()
        .filter(|r| !r.is_synced())
        .filter_map(|r| r.business_key())
        .collect();

    let mut plan = PullPlan {
        upserts: Vec::new(),
        skipped_unsynced: 0,
        prune: Vec::new(),
        placeholders: 0,
        dropped: 0,
    };
    let mut seen = HashSet::new();

    for parsed in remote {
        if parsed.placeholder {
            plan.placeholders += 1;
        }
        let Some(remote_id) = parsed.record.remote_id() else {
            plan.dropped += 1;
            continue;
        };
        if !seen.insert(remote_id) {
            continue;
        }
        let clashes_with_local = unsynced_ids.contains(&remote_id)
            || parsed
                .record
                .business_key()
                .is_some_and(|key| unsynced_keys.contains(&key));
        if clashes_with_local {
            plan.skipped_unsynced += 1;
        } else {
            plan.upserts.push(parsed.record);
        }
    }

    if complete {
        plan.prune = local
            .iter()
            .filter(|r| r.is_synced())
            .filter(|r| r.remote_id().is_some_and(|id| !seen.contains(&id)))
            .map(|r| r.local_id())
            .collect();
    }

    plan
}

/// Fetches every page of a collection. Returns the items and whether the
/// listing is complete.
pub(crate) async fn fetch_all(
    gateway: &dyn RemoteGateway,
    base: &ServerUrl,
    collection: Collection,
    page_size: u32,
) -> Result<(Vec<Value>, bool), SyncError> {
    let mut items = Vec::new();
    let mut page = 1;
    loop {
        let listing = gateway
            .list(base, collection, &ListQuery::page(page, page_size))
            .await?;
        let more = listing.has_more();
        items.extend(listing.items);
        if !more {
            return Ok((items, true));
        }
        if page >= MAX_PAGES {
            tracing::warn!("Stopped {} pull after {} pages", collection, page);
            return Ok((items, false));
        }
        page += 1;
    }
}

/// Runs the per-entity reconcilers against one store and gateway.
#[derive(Clone)]
pub struct ReconciliationEngine {
    store: LocalStore,
    gateway: Arc<dyn RemoteGateway>,
    page_size: u32,
}

impl ReconciliationEngine {
    pub fn new(store: LocalStore, gateway: Arc<dyn RemoteGateway>, page_size: u32) -> Self {
        Self {
            store,
            gateway,
            page_size: page_size.max(1),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn gateway(&self) -> &dyn RemoteGateway {
        self.gateway.as_ref()
    }

    pub async fn sync_collection(
        &self,
        base: &ServerUrl,
        collection: Collection,
    ) -> Result<ReconcileReport, SyncError> {
        match collection {
            Collection::Repairs => self.sync_repairs(base).await,
            Collection::WarehouseItems => self.sync_warehouse(base).await,
            Collection::Transactions => self.sync_transactions(base).await,
        }
    }
}
