//! Sync policy state machine.
//!
//! The orchestrator decides when a sync run may happen, drives the
//! reconcilers in a fixed order, counts failures and trips offline mode.
//! Public entry points are fire-and-forget: they spawn onto one supervising
//! [`JoinSet`] and return immediately. State is published on a watch
//! channel; no method hands a run result back to the UI.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use super::connectivity::{ConnectivityError, ConnectivityMonitor, NetworkSource};
use super::error::{AbsorbedError, RunOutcome, RunReport, SkipReason, SyncError, SyncTrigger};
use super::reconcile::{PushResult, ReconciliationEngine};
use super::state::{SyncPolicy, SyncState, SyncStatus};
use crate::db::LocalStore;
use crate::models::Repair;
use crate::remote::{
    Collection, LockClient, LockError, LockState, ReleaseOutcome, RemoteGateway, ServerUrl,
};

struct Inner {
    store: LocalStore,
    engine: ReconciliationEngine,
    locks: LockClient,
    monitor: ConnectivityMonitor,
    policy: SyncPolicy,
    device_id: String,
    state: Mutex<SyncState>,
    status_tx: watch::Sender<SyncStatus>,
    tasks: Mutex<JoinSet<()>>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    held_locks: Mutex<HashSet<i64>>,
    // Serialises repair pushes so a run and an immediate push never both
    // create the same ticket.
    push_lock: tokio::sync::Mutex<()>,
    // Held from receipt allocation until the row is inserted.
    create_lock: tokio::sync::Mutex<()>,
}

/// Cloneable handle; all clones drive the same state.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

/// Ends a run on every exit path, including panics.
struct RunGuard<'a> {
    inner: &'a Inner,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.end_run();
        self.inner.status_tx.send_replace(state.status());
    }
}

/// Counts one in-flight creation; the guard holds while any remain.
struct CreatingGuard<'a> {
    inner: &'a Inner,
}

impl<'a> CreatingGuard<'a> {
    fn enter(inner: &'a Inner) -> Self {
        let mut state = inner.state.lock();
        state.begin_create();
        inner.status_tx.send_replace(state.status());
        Self { inner }
    }
}

impl Drop for CreatingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        state.end_create();
        self.inner.status_tx.send_replace(state.status());
    }
}

impl SyncOrchestrator {
    pub fn new(
        store: LocalStore,
        gateway: Arc<dyn RemoteGateway>,
        network: Arc<dyn NetworkSource>,
        policy: SyncPolicy,
        device_id: impl Into<String>,
    ) -> Self {
        let engine = ReconciliationEngine::new(store.clone(), gateway.clone(), policy.page_size);
        let locks = LockClient::new(gateway, store.preferences());
        let state = SyncState::new();
        let (status_tx, _) = watch::channel(state.status());

        Self {
            inner: Arc::new(Inner {
                store,
                engine,
                locks,
                monitor: ConnectivityMonitor::new(network),
                policy,
                device_id: device_id.into(),
                state: Mutex::new(state),
                status_tx,
                tasks: Mutex::new(JoinSet::new()),
                listeners: Mutex::new(Vec::new()),
                held_locks: Mutex::new(HashSet::new()),
                push_lock: tokio::sync::Mutex::new(()),
                create_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.state.lock().status()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status_tx.subscribe()
    }

    fn publish(&self, state: &SyncState) {
        self.inner.status_tx.send_replace(state.status());
    }

    /// Spawns `future` onto the supervising scope.
    fn spawn<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.inner.tasks.lock();
        while let Some(finished) = tasks.try_join_next() {
            log_task_exit(finished);
        }
        tasks.spawn(future);
    }

    /// Waits for every spawned task to finish, including tasks spawned
    /// while waiting. Long-lived listeners are not included.
    pub async fn wait_idle(&self) {
        loop {
            let mut drained = std::mem::take(&mut *self.inner.tasks.lock());
            if drained.is_empty() {
                return;
            }
            while let Some(finished) = drained.join_next().await {
                log_task_exit(finished);
            }
        }
    }

    /// Starts observing connectivity and the periodic timer, and syncs right
    /// away when the network is up.
    pub fn start(&self) -> Result<(), ConnectivityError> {
        let mut events = self.inner.monitor.start()?;

        let listener = {
            let this = self.clone();
            tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    tracing::debug!("Connectivity event: {:?}", event);
                    this.trigger(SyncTrigger::Connectivity);
                }
            })
        };

        let ticker = {
            let this = self.clone();
            let period = self.inner.policy.interval.max(Duration::from_secs(1));
            tokio::spawn(async move {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                loop {
                    interval.tick().await;
                    this.trigger(SyncTrigger::Periodic);
                }
            })
        };

        self.inner.listeners.lock().extend([listener, ticker]);
        tracing::info!("Sync orchestrator started");

        if self.inner.monitor.is_reachable() {
            self.trigger(SyncTrigger::Startup);
        }
        Ok(())
    }

    /// Stops future triggers and releases held locks best-effort. A run in
    /// flight is left to finish.
    pub fn stop(&self) {
        match self.inner.monitor.stop() {
            Ok(()) => {}
            Err(ConnectivityError::NotRegistered) => {
                tracing::debug!("Stop without an active registration");
            }
            Err(e) => tracing::warn!("Failed to stop connectivity observation: {}", e),
        }
        for handle in self.inner.listeners.lock().drain(..) {
            handle.abort();
        }

        let held: Vec<i64> = self.inner.held_locks.lock().drain().collect();
        for entity_id in held {
            self.release_lock(entity_id);
        }
        tracing::info!("Sync orchestrator stopped");
    }

    fn trigger(&self, trigger: SyncTrigger) {
        let this = self.clone();
        self.spawn(async move {
            this.run_sync(trigger).await;
        });
    }

    /// Forced sync: skips the concurrency, guard and interval gates but
    /// still respects offline mode.
    pub fn sync_now(&self) {
        self.trigger(SyncTrigger::Manual);
    }

    pub fn set_creating_repair_guard(&self, creating: bool) {
        let mut state = self.inner.state.lock();
        state.set_creating_repair(creating);
        self.publish(&state);
    }

    /// Turning offline mode off clears the failure count and retries at once.
    pub fn set_offline_mode(&self, offline: bool) {
        {
            let mut state = self.inner.state.lock();
            state.set_offline(offline);
            self.publish(&state);
        }
        if offline {
            tracing::info!("Offline mode enabled");
        } else {
            tracing::info!("Offline mode disabled, retrying");
            self.trigger(SyncTrigger::Retry);
        }
    }

    pub fn retry_connection(&self) {
        self.set_offline_mode(false);
    }

    /// Runs the network-free gates, then the URL and reachability checks.
    async fn eligible_base(&self, forced: bool) -> Result<ServerUrl, RunOutcome> {
        self.inner
            .state
            .lock()
            .check_gate(forced, Instant::now(), &self.inner.policy)
            .map_err(RunOutcome::Skipped)?;

        let base = match self.inner.store.preferences().server_url().await {
            Ok(Some(base)) => base,
            Ok(None) => return Err(RunOutcome::Skipped(SkipReason::NotConfigured)),
            Err(e) => return Err(RunOutcome::Failed(e.into())),
        };
        if !self.inner.monitor.is_reachable() {
            return Err(RunOutcome::Skipped(SkipReason::Unreachable));
        }
        Ok(base)
    }

    fn offline_now(&self) -> bool {
        self.inner.state.lock().is_offline()
    }

    /// One full sync run. Public entry points wrap this in a spawned task;
    /// callers that need the outcome may await it directly.
    pub async fn run_sync(&self, trigger: SyncTrigger) -> RunOutcome {
        let forced = trigger.is_forced();
        let base = match self.eligible_base(forced).await {
            Ok(base) => base,
            Err(outcome) => {
                match &outcome {
                    RunOutcome::Skipped(reason) => {
                        tracing::debug!("Skipping {} sync: {}", trigger, reason)
                    }
                    RunOutcome::Failed(e) => tracing::error!("Cannot start sync: {}", e),
                    RunOutcome::Completed { .. } => {}
                }
                return outcome;
            }
        };

        // The URL read awaited; the in-memory gates may have changed.
        let _run = {
            let mut state = self.inner.state.lock();
            if let Err(reason) = state.check_gate(forced, Instant::now(), &self.inner.policy) {
                tracing::debug!("Skipping {} sync: {}", trigger, reason);
                return RunOutcome::Skipped(reason);
            }
            state.begin_run(Instant::now(), Utc::now());
            self.publish(&state);
            RunGuard { inner: &self.inner }
        };

        tracing::info!("Sync started ({})", trigger);
        let outcome = self.reconcile_all(&base).await;

        let mut state = self.inner.state.lock();
        match &outcome {
            RunOutcome::Completed { report, absorbed } => {
                state.record_success();
                tracing::info!(
                    "Sync finished: {} repairs pulled, {} pushed, {} absorbed error(s)",
                    report.repairs.pulled,
                    report.repairs.pushed,
                    absorbed.len()
                );
            }
            RunOutcome::Failed(e) => {
                let tripped = state.record_failure(e, self.inner.policy.failure_threshold);
                tracing::warn!(
                    "Sync failed ({} consecutive): {}",
                    state.failure_count(),
                    e
                );
                if tripped {
                    tracing::error!(
                        "Sync failed {} times in a row, switching to offline mode",
                        state.failure_count()
                    );
                }
            }
            RunOutcome::Skipped(_) => {}
        }
        self.publish(&state);
        outcome
    }

    /// Repairs escalate; warehouse and transactions are absorbed.
    async fn reconcile_all(&self, base: &ServerUrl) -> RunOutcome {
        let engine = &self.inner.engine;

        let repairs = {
            let _push = self.inner.push_lock.lock().await;
            engine.sync_repairs(base).await
        };
        let mut report = RunReport {
            repairs: match repairs {
                Ok(report) => report,
                Err(e) => return RunOutcome::Failed(e),
            },
            ..RunReport::default()
        };

        let mut absorbed = Vec::new();
        for collection in [Collection::WarehouseItems, Collection::Transactions] {
            if self.offline_now() {
                return RunOutcome::Failed(SyncError::Offline);
            }
            match engine.sync_collection(base, collection).await {
                Ok(collection_report) => match collection {
                    Collection::WarehouseItems => report.warehouse = Some(collection_report),
                    _ => report.transactions = Some(collection_report),
                },
                Err(error) => {
                    tracing::warn!("Sync of {} failed, continuing: {}", collection, error);
                    absorbed.push(AbsorbedError { collection, error });
                }
            }
        }

        RunOutcome::Completed { report, absorbed }
    }

    /// Takes the edit lock on a remote repair for this device.
    pub async fn acquire_lock(&self, entity_id: i64) -> Result<LockState, LockError> {
        if self.offline_now() {
            return Err(LockError::Offline);
        }
        let state = self
            .inner
            .locks
            .acquire(entity_id, &self.inner.device_id)
            .await?;
        self.inner.held_locks.lock().insert(entity_id);
        Ok(state)
    }

    pub async fn query_lock(&self, entity_id: i64) -> Result<LockState, LockError> {
        if self.offline_now() {
            return Err(LockError::Offline);
        }
        self.inner.locks.query(entity_id).await
    }

    /// Best-effort release; failures are logged and returned as absorbed.
    pub async fn release_lock_now(&self, entity_id: i64) -> ReleaseOutcome {
        self.inner.held_locks.lock().remove(&entity_id);
        if self.offline_now() {
            tracing::warn!("Offline, not releasing lock on {}", entity_id);
            return ReleaseOutcome::Absorbed(LockError::Offline);
        }
        self.inner
            .locks
            .release_best_effort(entity_id, &self.inner.device_id)
            .await
    }

    /// Fire-and-forget release from the orchestrator's scope.
    pub fn release_lock(&self, entity_id: i64) {
        let this = self.clone();
        self.spawn(async move {
            this.release_lock_now(entity_id).await;
        });
    }

    pub fn held_locks(&self) -> Vec<i64> {
        let mut held: Vec<i64> = self.inner.held_locks.lock().iter().copied().collect();
        held.sort_unstable();
        held
    }

    /// Saves a new repair locally under the next receipt number and pushes
    /// it right away when possible. A failed push leaves the row unsynced
    /// for the next run.
    pub async fn create_repair(&self, repair: Repair) -> Result<Repair, SyncError> {
        let _guard = CreatingGuard::enter(&self.inner);

        let repo = self.inner.store.repairs();
        let created = {
            let _create = self.inner.create_lock.lock().await;
            let mut repair = repair;
            if repair.receipt_number <= 0 {
                repair.receipt_number = repo.next_receipt_number().await?;
            }
            repo.insert_local(&repair).await?
        };
        tracing::info!("Created repair #{} locally", created.receipt_number);

        // Forced gate: the creating guard is ours.
        let base = match self.eligible_base(true).await {
            Ok(base) => base,
            Err(outcome) => {
                tracing::debug!("Not pushing new repair now: {:?}", outcome.skip_reason());
                return Ok(created);
            }
        };

        let pushed = {
            let _push = self.inner.push_lock.lock().await;
            self.inner.engine.push_repair(&base, &created).await
        };
        match pushed {
            Ok(PushResult::Pushed { .. }) => {}
            Ok(PushResult::Rejected(e)) => {
                tracing::warn!("Server rejected new repair, will retry: {}", e)
            }
            Err(e) => tracing::warn!("Immediate push failed, will retry: {}", e),
        }

        Ok(repo.get_by_id(created.id).await?.unwrap_or(created))
    }
}

fn log_task_exit(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!("Sync task panicked: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::FakeGateway;
    use crate::remote::RemoteError;
    use crate::sync::connectivity::{ManualNetworkSource, NetworkCapabilities};
    use tempfile::TempDir;

    struct Fixture {
        orchestrator: SyncOrchestrator,
        gateway: Arc<FakeGateway>,
        network: Arc<ManualNetworkSource>,
        store: LocalStore,
        _temp: TempDir,
    }

    async fn setup() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::open(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        store
            .preferences()
            .set_server_url("http://shop.local:8080")
            .await
            .unwrap();
        let gateway = FakeGateway::new();
        let network = ManualNetworkSource::new(NetworkCapabilities::internet());
        let orchestrator = SyncOrchestrator::new(
            store.clone(),
            gateway.clone(),
            network.clone(),
            SyncPolicy::default(),
            "device-a",
        );
        Fixture {
            orchestrator,
            gateway,
            network,
            store,
            _temp: temp_dir,
        }
    }

    fn network_error() -> RemoteError {
        RemoteError::Network("connection refused".to_string())
    }

    async fn wait_until_syncing(orchestrator: &SyncOrchestrator) {
        for _ in 0..200 {
            if orchestrator.status().is_syncing {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("sync never started");
    }

    #[tokio::test]
    async fn test_threshold_invariant() {
        let f = setup().await;
        f.gateway.fail_collection(Collection::Repairs, network_error());

        for expected in 1..=2 {
            let calls = f.gateway.calls();
            let outcome = f.orchestrator.run_sync(SyncTrigger::Manual).await;
            assert!(matches!(outcome, RunOutcome::Failed(SyncError::Network(_))));
            // The failed repairs listing ends the run.
            assert_eq!(f.gateway.calls(), calls + 1);
            let status = f.orchestrator.status();
            assert_eq!(status.failure_count, expected);
            assert!(!status.offline_mode);
        }
        assert!(f
            .gateway
            .collections_called()
            .iter()
            .all(|c| *c == Collection::Repairs));

        f.orchestrator.run_sync(SyncTrigger::Manual).await;
        let status = f.orchestrator.status();
        assert!(status.offline_mode);
        assert!(status.last_error.is_some());
    }

    #[tokio::test]
    async fn test_collections_sync_in_order() {
        let f = setup().await;
        f.store
            .repairs()
            .insert_local(&Repair::new(3, "Ann", "Pixel 6"))
            .await
            .unwrap();

        assert!(f.orchestrator.run_sync(SyncTrigger::Manual).await.is_completed());

        let mut order = f.gateway.collections_called();
        order.dedup();
        assert_eq!(
            order,
            vec![
                Collection::Repairs,
                Collection::WarehouseItems,
                Collection::Transactions
            ]
        );
    }

    #[tokio::test]
    async fn test_success_resets_counter() {
        let f = setup().await;
        f.gateway.fail_collection(Collection::Repairs, network_error());
        f.orchestrator.run_sync(SyncTrigger::Manual).await;
        f.orchestrator.run_sync(SyncTrigger::Manual).await;
        assert_eq!(f.orchestrator.status().failure_count, 2);

        f.gateway.heal();
        let outcome = f.orchestrator.run_sync(SyncTrigger::Manual).await;
        assert!(outcome.is_completed());
        assert_eq!(f.orchestrator.status().failure_count, 0);
        assert!(f.orchestrator.status().last_error.is_none());
    }

    #[tokio::test]
    async fn test_reference_data_failures_are_absorbed() {
        let f = setup().await;
        f.gateway.fail_collection(Collection::WarehouseItems, network_error());
        f.gateway.fail_collection(
            Collection::Transactions,
            RemoteError::Server {
                status: 500,
                message: String::new(),
            },
        );

        match f.orchestrator.run_sync(SyncTrigger::Manual).await {
            RunOutcome::Completed { absorbed, report } => {
                assert_eq!(absorbed.len(), 2);
                assert_eq!(absorbed[0].collection, Collection::WarehouseItems);
                assert!(report.warehouse.is_none());
            }
            other => panic!("expected completed run, got {:?}", other),
        }
        assert_eq!(f.orchestrator.status().failure_count, 0);
    }

    #[tokio::test]
    async fn test_mutual_exclusion() {
        let f = setup().await;
        f.gateway.set_delay(Duration::from_millis(200));

        let running = {
            let orchestrator = f.orchestrator.clone();
            tokio::spawn(async move { orchestrator.run_sync(SyncTrigger::Manual).await })
        };
        wait_until_syncing(&f.orchestrator).await;

        let calls = f.gateway.calls();
        let status = f.orchestrator.status();
        let outcome = f.orchestrator.run_sync(SyncTrigger::Connectivity).await;
        assert_eq!(outcome.skip_reason(), Some(SkipReason::AlreadySyncing));
        assert_eq!(f.gateway.calls(), calls);
        assert_eq!(f.orchestrator.status(), status);

        let forced = f.orchestrator.run_sync(SyncTrigger::Manual).await;
        assert!(forced.is_completed());
        assert!(running.await.unwrap().is_completed());
        assert!(!f.orchestrator.status().is_syncing);
    }

    #[tokio::test]
    async fn test_creating_guard_gate() {
        let f = setup().await;
        f.orchestrator.set_creating_repair_guard(true);

        let outcome = f.orchestrator.run_sync(SyncTrigger::Periodic).await;
        assert_eq!(outcome.skip_reason(), Some(SkipReason::CreatingRepair));
        assert_eq!(f.gateway.calls(), 0);

        f.orchestrator.sync_now();
        f.orchestrator.wait_idle().await;
        assert!(f.gateway.calls() > 0);
    }

    #[tokio::test]
    async fn test_interval_gate() {
        let f = setup().await;

        assert!(f.orchestrator.run_sync(SyncTrigger::Periodic).await.is_completed());
        let calls = f.gateway.calls();
        let second = f.orchestrator.run_sync(SyncTrigger::Connectivity).await;
        assert_eq!(second.skip_reason(), Some(SkipReason::TooSoon));
        assert_eq!(f.gateway.calls(), calls);
    }

    #[tokio::test]
    async fn test_offline_suppression() {
        let f = setup().await;
        f.orchestrator.set_offline_mode(true);

        f.orchestrator.sync_now();
        f.orchestrator.start().unwrap();
        f.network.set(NetworkCapabilities::none());
        f.network.set(NetworkCapabilities::internet());
        tokio::time::sleep(Duration::from_millis(20)).await;
        f.orchestrator.wait_idle().await;
        assert!(matches!(
            f.orchestrator.acquire_lock(1).await,
            Err(LockError::Offline)
        ));
        assert_eq!(f.gateway.calls(), 0);

        f.orchestrator.set_offline_mode(false);
        f.orchestrator.wait_idle().await;
        assert!(f.gateway.calls() > 0);
        f.orchestrator.stop();
    }

    #[tokio::test]
    async fn test_unreachable_and_unconfigured_skip_silently() {
        let f = setup().await;
        f.network.set(NetworkCapabilities::none());
        let outcome = f.orchestrator.run_sync(SyncTrigger::Manual).await;
        assert_eq!(outcome.skip_reason(), Some(SkipReason::Unreachable));

        f.network.set(NetworkCapabilities::internet());
        f.store.preferences().set_server_url("").await.unwrap();
        let outcome = f.orchestrator.run_sync(SyncTrigger::Manual).await;
        assert_eq!(outcome.skip_reason(), Some(SkipReason::NotConfigured));

        assert_eq!(f.gateway.calls(), 0);
        assert_eq!(f.orchestrator.status().failure_count, 0);
    }

    #[tokio::test]
    async fn test_connectivity_edge_triggers_sync() {
        let f = setup().await;
        f.network.set(NetworkCapabilities::none());
        f.orchestrator.start().unwrap();
        f.orchestrator.wait_idle().await;
        assert_eq!(f.gateway.calls(), 0);

        f.network.set(NetworkCapabilities::internet());
        for _ in 0..200 {
            if f.orchestrator.status().last_sync_time.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        f.orchestrator.wait_idle().await;
        assert!(f.gateway.calls() > 0);

        f.orchestrator.stop();
        // Second stop is tolerated.
        f.orchestrator.stop();
    }

    #[tokio::test]
    async fn test_stop_releases_held_locks() {
        let f = setup().await;
        f.orchestrator.acquire_lock(42).await.unwrap();
        assert_eq!(f.orchestrator.held_locks(), vec![42]);

        f.orchestrator.stop();
        f.orchestrator.wait_idle().await;

        assert!(f.orchestrator.held_locks().is_empty());
        assert!(!f.gateway.store.lock_state(42).locked);
    }

    #[tokio::test]
    async fn test_release_absorbs_failure() {
        let f = setup().await;
        f.orchestrator.acquire_lock(42).await.unwrap();
        f.gateway.fail_everything(network_error());

        let outcome = f.orchestrator.release_lock_now(42).await;
        assert!(!outcome.is_released());
        assert!(f.gateway.store.lock_state(42).is_held_by("device-a"));
    }

    #[tokio::test]
    async fn test_create_repair_pushes_immediately() {
        let f = setup().await;

        let created = f
            .orchestrator
            .create_repair(Repair::new(0, "Ann", "Pixel 6"))
            .await
            .unwrap();

        assert_eq!(created.receipt_number, 1);
        assert!(created.synced);
        assert!(created.remote_id.is_some());
        assert!(!f.orchestrator.status().creating_repair);
    }

    #[tokio::test]
    async fn test_concurrent_creations_get_distinct_receipts() {
        let f = setup().await;
        f.gateway.set_delay(Duration::from_millis(50));

        let (ann, bob) = tokio::join!(
            f.orchestrator.create_repair(Repair::new(0, "Ann", "Pixel 6")),
            f.orchestrator.create_repair(Repair::new(0, "Bob", "iPhone 12")),
        );
        let (ann, bob) = (ann.unwrap(), bob.unwrap());

        assert_ne!(ann.receipt_number, bob.receipt_number);
        let local = f.store.repairs().list().await.unwrap();
        assert_eq!(local.len(), 2);
        assert!(local.iter().all(|r| r.synced));
        assert_eq!(f.gateway.store.count(Collection::Repairs), 2);
        assert!(!f.orchestrator.status().creating_repair);
    }

    #[tokio::test]
    async fn test_create_repair_offline_stays_unsynced() {
        let f = setup().await;
        f.gateway.fail_everything(network_error());

        let created = f
            .orchestrator
            .create_repair(Repair::new(0, "Ann", "Pixel 6"))
            .await
            .unwrap();

        assert!(!created.synced);
        assert_eq!(f.orchestrator.status().failure_count, 0);
        assert!(!f.orchestrator.status().creating_repair);

        f.gateway.heal();
        assert!(f.orchestrator.run_sync(SyncTrigger::Manual).await.is_completed());
        let row = f.store.repairs().get_by_id(created.id).await.unwrap().unwrap();
        assert!(row.synced);
    }
}
