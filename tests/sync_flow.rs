//! End-to-end tests: real axum router on an ephemeral port, real
//! `HttpGateway`, real sqlite store.

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use shopsync::db::LocalStore;
use shopsync::models::{Repair, TransactionKind};
use shopsync::remote::{Collection, GatewayTimeouts, HttpGateway, LockError};
use shopsync::server::{router, RemoteStore};
use shopsync::sync::{
    ManualNetworkSource, NetworkCapabilities, RunOutcome, SyncError, SyncOrchestrator,
    SyncPolicy, SyncTrigger,
};

async fn serve(remote: Arc<RemoteStore>, api_keys: HashSet<String>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(remote, api_keys)).await.unwrap();
    });
    format!("http://{}", addr)
}

struct Device {
    store: LocalStore,
    orchestrator: SyncOrchestrator,
    _dir: TempDir,
}

async fn device(name: &str, api_key: Option<&str>, page_size: u32) -> Device {
    let dir = TempDir::new().unwrap();
    let store = LocalStore::open(&dir.path().join("shop.db")).await.unwrap();
    let timeouts = GatewayTimeouts {
        connect: Duration::from_secs(2),
        read: Duration::from_secs(2),
        request: Duration::from_secs(4),
    };
    let gateway = Arc::new(HttpGateway::new(timeouts, api_key.map(str::to_string)).unwrap());
    let network = ManualNetworkSource::new(NetworkCapabilities::internet());
    let policy = SyncPolicy {
        page_size,
        ..SyncPolicy::default()
    };
    let orchestrator = SyncOrchestrator::new(store.clone(), gateway, network, policy, name);
    Device {
        store,
        orchestrator,
        _dir: dir,
    }
}

async fn configure(device: &Device, base: &str) {
    device
        .store
        .preferences()
        .set_server_url(base)
        .await
        .unwrap();
}

fn completed(outcome: &RunOutcome) -> &shopsync::sync::RunReport {
    match outcome {
        RunOutcome::Completed { report, absorbed } => {
            assert!(absorbed.is_empty(), "absorbed: {:?}", absorbed);
            report
        }
        other => panic!("expected a completed run, got {:?}", other),
    }
}

#[tokio::test]
async fn test_lock_mutual_exclusion_between_devices() {
    let base = serve(Arc::new(RemoteStore::new()), HashSet::new()).await;
    let a = device("tablet-a", None, 100).await;
    let b = device("tablet-b", None, 100).await;
    configure(&a, &base).await;
    configure(&b, &base).await;

    let held = a.orchestrator.acquire_lock(42).await.unwrap();
    assert!(held.is_held_by("tablet-a"));

    match b.orchestrator.acquire_lock(42).await {
        Err(LockError::HeldByOther(state)) => {
            assert_eq!(state.holder_device.as_deref(), Some("tablet-a"))
        }
        other => panic!("expected a conflict, got {:?}", other),
    }

    assert!(a.orchestrator.release_lock_now(42).await.is_released());

    let held = b.orchestrator.acquire_lock(42).await.unwrap();
    assert!(held.is_held_by("tablet-b"));
    let seen_by_a = a.orchestrator.query_lock(42).await.unwrap();
    assert!(seen_by_a.is_held_by_other("tablet-a"));
}

#[tokio::test]
async fn test_unsynced_repair_survives_pull_and_is_pushed() {
    let remote = Arc::new(RemoteStore::new());
    for n in 1..=77 {
        remote
            .create(
                Collection::Repairs,
                json!({"receipt_number": 500 + n, "client_name": "Remote", "status": "queued"}),
            )
            .unwrap();
    }
    let base = serve(remote.clone(), HashSet::new()).await;

    // Created before any server was configured, on local id 77.
    let shop = device("front-desk", None, 20).await;
    let repo = shop.store.repairs();
    for n in 1..=76 {
        let row = repo.insert_local(&Repair::new(1000 + n, "Pad", "X")).await.unwrap();
        repo.delete(row.id).await.unwrap();
    }
    let local = shop
        .orchestrator
        .create_repair(Repair::new(77, "Walk-in", "iPad").with_problem("Cracked screen"))
        .await
        .unwrap();
    assert_eq!(local.id, 77);
    assert!(!local.synced);

    configure(&shop, &base).await;
    let outcome = shop.orchestrator.run_sync(SyncTrigger::Manual).await;
    let report = completed(&outcome);
    assert_eq!(report.repairs.pulled, 77);
    assert_eq!(report.repairs.pushed, 1);

    let row = repo.get_by_id(77).await.unwrap().unwrap();
    assert_eq!(row.client_name, "Walk-in");
    assert_eq!(row.problem, "Cracked screen");
    assert!(row.synced);

    let remote_id = row.remote_id.unwrap();
    assert_ne!(remote_id, 77);
    let confirmed = remote.get(Collection::Repairs, remote_id).unwrap();
    assert_eq!(confirmed["receipt_number"], json!(77));
    assert_eq!(remote.count(Collection::Repairs), 78);

    // A second run is a no-op for the pushed ticket.
    let outcome = shop.orchestrator.run_sync(SyncTrigger::Manual).await;
    assert_eq!(completed(&outcome).repairs.pushed, 0);
    assert_eq!(remote.count(Collection::Repairs), 78);
}

#[tokio::test]
async fn test_pull_pages_every_collection() {
    let remote = Arc::new(RemoteStore::new());
    for n in 1..=7 {
        remote
            .create(
                Collection::Transactions,
                json!({"type": "income", "amount": n * 10, "description": format!("Payment {}", n)}),
            )
            .unwrap();
    }
    remote
        .create(
            Collection::WarehouseItems,
            json!({"name": "Battery", "sku": "BAT-1", "quantity": "4", "price": "12,50"}),
        )
        .unwrap();
    let base = serve(remote, HashSet::new()).await;

    let shop = device("back-office", None, 3).await;
    configure(&shop, &base).await;

    let outcome = shop.orchestrator.run_sync(SyncTrigger::Manual).await;
    let report = completed(&outcome);
    assert_eq!(report.transactions.as_ref().map(|r| r.pulled), Some(7));

    let transactions = shop.store.transactions().list().await.unwrap();
    assert_eq!(transactions.len(), 7);
    assert!(transactions
        .iter()
        .all(|t| t.kind == TransactionKind::Income && t.synced));

    let items = shop.store.warehouse().list().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 4);
    assert!((items[0].price - 12.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_rejected_credentials_count_as_failures() {
    let base = serve(
        Arc::new(RemoteStore::new()),
        HashSet::from(["shop-key".to_string()]),
    )
    .await;

    let intruder = device("unknown", Some("wrong-key"), 100).await;
    configure(&intruder, &base).await;
    let outcome = intruder.orchestrator.run_sync(SyncTrigger::Manual).await;
    assert!(matches!(
        outcome,
        RunOutcome::Failed(SyncError::Server { status: 401, .. })
    ));
    assert_eq!(intruder.orchestrator.status().failure_count, 1);

    let staff = device("staff", Some("shop-key"), 100).await;
    configure(&staff, &base).await;
    let outcome = staff.orchestrator.run_sync(SyncTrigger::Manual).await;
    assert!(outcome.is_completed());
    assert_eq!(staff.orchestrator.status().failure_count, 0);
}
