//! Offline-first synchronisation engine.
//!
//! [`SyncOrchestrator`] owns the policy: it gates runs, sequences the
//! per-entity reconcilers (repairs first, then warehouse and transactions),
//! counts escalated failures and switches to offline mode after
//! [`FAILURE_THRESHOLD`] of them in a row. [`ConnectivityMonitor`] feeds it
//! edge-triggered reachability events.

pub mod connectivity;
mod error;
mod orchestrator;
pub mod reconcile;
mod state;

pub use connectivity::{
    ConnectivityError, ConnectivityMonitor, EdgeDetector, ManualNetworkSource,
    NetworkCapabilities, NetworkChange, NetworkSource, ReachabilityEvent, ReachabilityEvents,
    SysfsNetworkSource, Transport,
};
pub use error::{AbsorbedError, RunOutcome, RunReport, SkipReason, SyncError, SyncTrigger};
pub use orchestrator::SyncOrchestrator;
pub use reconcile::{plan_pull, PullPlan, PushResult, ReconcileReport, ReconciliationEngine};
pub use state::{SyncPolicy, SyncState, SyncStatus, FAILURE_THRESHOLD, SYNC_INTERVAL};
