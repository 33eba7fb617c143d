mod repair;
mod repair_status;
mod transaction;
mod warehouse_item;

use chrono::{DateTime, Utc};

pub use repair::Repair;
pub use repair_status::{status_code, status_label, RepairStatus, StatusCode};
pub use transaction::{Transaction, TransactionKind};
pub use warehouse_item::WarehouseItem;

/// Row-level sync bookkeeping shared by every synchronised entity.
///
/// A record with `is_synced() == false` was changed locally and the remote
/// has not confirmed it yet. Pulls must leave such rows alone.
pub trait SyncableRecord {
    fn local_id(&self) -> i64;
    fn remote_id(&self) -> Option<i64>;
    fn is_synced(&self) -> bool;
    fn last_modified(&self) -> DateTime<Utc>;

    /// Secondary key used to match a local unsynced row to its remote twin
    /// when the remote id is not known yet.
    fn business_key(&self) -> Option<String> {
        None
    }
}
