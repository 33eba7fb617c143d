//! In-process [`RemoteGateway`] for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::gateway::RemoteGateway;
use super::{Collection, HealthInfo, ListPage, ListQuery, LockState, RemoteError, ServerUrl};
use crate::server::{RemoteStore, StorageError};

/// Backed by a [`RemoteStore`]; counts every call and can be told to fail.
#[derive(Default)]
pub struct FakeGateway {
    pub store: RemoteStore,
    calls: AtomicUsize,
    failures: Mutex<HashMap<Collection, RemoteError>>,
    fail_all: Mutex<Option<RemoteError>>,
    delay: Mutex<Option<Duration>>,
    trace: Mutex<Vec<Collection>>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Collections touched so far, one entry per call, in call order.
    pub fn collections_called(&self) -> Vec<Collection> {
        self.trace.lock().clone()
    }

    pub fn fail_collection(&self, collection: Collection, error: RemoteError) {
        self.failures.lock().insert(collection, error);
    }

    pub fn fail_everything(&self, error: RemoteError) {
        *self.fail_all.lock() = Some(error);
    }

    pub fn heal(&self) {
        self.failures.lock().clear();
        *self.fail_all.lock() = None;
    }

    /// Every call sleeps this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn seed(&self, collection: Collection, records: Vec<Value>) {
        for record in records {
            let _ = self.store.create(collection, record);
        }
    }

    async fn enter(&self, collection: Option<Collection>) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(collection) = collection {
            self.trace.lock().push(collection);
        }
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.fail_all.lock().clone() {
            return Err(error);
        }
        if let Some(collection) = collection {
            if let Some(error) = self.failures.lock().get(&collection).cloned() {
                return Err(error);
            }
        }
        Ok(())
    }
}

fn to_remote(error: StorageError) -> RemoteError {
    match error {
        StorageError::Locked(state) => RemoteError::Conflict(state),
        StorageError::NotFound(..) => RemoteError::Server {
            status: 404,
            message: error.to_string(),
        },
        StorageError::InvalidBody(_) => RemoteError::Server {
            status: 400,
            message: error.to_string(),
        },
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn health(&self, _base: &ServerUrl) -> Result<HealthInfo, RemoteError> {
        self.enter(None).await?;
        Ok(HealthInfo {
            status: "ok".to_string(),
            version: None,
        })
    }

    async fn list(
        &self,
        _base: &ServerUrl,
        collection: Collection,
        query: &ListQuery,
    ) -> Result<ListPage, RemoteError> {
        self.enter(Some(collection)).await?;
        Ok(self.store.list(collection, query))
    }

    async fn get(
        &self,
        _base: &ServerUrl,
        collection: Collection,
        id: i64,
    ) -> Result<Option<Value>, RemoteError> {
        self.enter(Some(collection)).await?;
        Ok(self.store.get(collection, id))
    }

    async fn create(
        &self,
        _base: &ServerUrl,
        collection: Collection,
        body: &Value,
    ) -> Result<Value, RemoteError> {
        self.enter(Some(collection)).await?;
        self.store.create(collection, body.clone()).map_err(to_remote)
    }

    async fn update(
        &self,
        _base: &ServerUrl,
        collection: Collection,
        id: i64,
        body: &Value,
    ) -> Result<Value, RemoteError> {
        self.enter(Some(collection)).await?;
        self.store
            .update(collection, id, body.clone())
            .map_err(to_remote)
    }

    async fn delete(
        &self,
        _base: &ServerUrl,
        collection: Collection,
        id: i64,
    ) -> Result<(), RemoteError> {
        self.enter(Some(collection)).await?;
        self.store.delete(collection, id).map_err(to_remote)
    }

    async fn lock_query(
        &self,
        _base: &ServerUrl,
        entity_id: i64,
    ) -> Result<LockState, RemoteError> {
        self.enter(None).await?;
        Ok(self.store.lock_state(entity_id))
    }

    async fn lock_acquire(
        &self,
        _base: &ServerUrl,
        entity_id: i64,
        holder_device: &str,
    ) -> Result<LockState, RemoteError> {
        self.enter(None).await?;
        self.store
            .acquire_lock(entity_id, holder_device)
            .map_err(to_remote)
    }

    async fn lock_release(
        &self,
        _base: &ServerUrl,
        entity_id: i64,
        holder_device: &str,
    ) -> Result<(), RemoteError> {
        self.enter(None).await?;
        self.store
            .release_lock(entity_id, holder_device)
            .map_err(to_remote)
    }
}
