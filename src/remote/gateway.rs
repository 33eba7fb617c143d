use async_trait::async_trait;
use serde_json::Value;

use super::{Collection, HealthInfo, ListPage, ListQuery, LockState, RemoteError, ServerUrl};

/// Typed request/response access to the remote service.
///
/// The base URL is passed on every call; implementations must not cache it.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Lightweight reachability and version check.
    async fn health(&self, base: &ServerUrl) -> Result<HealthInfo, RemoteError>;

    async fn list(
        &self,
        base: &ServerUrl,
        collection: Collection,
        query: &ListQuery,
    ) -> Result<ListPage, RemoteError>;

    /// `Ok(None)` when the entity does not exist.
    async fn get(
        &self,
        base: &ServerUrl,
        collection: Collection,
        id: i64,
    ) -> Result<Option<Value>, RemoteError>;

    /// Returns the stored record, including its assigned id.
    async fn create(
        &self,
        base: &ServerUrl,
        collection: Collection,
        body: &Value,
    ) -> Result<Value, RemoteError>;

    async fn update(
        &self,
        base: &ServerUrl,
        collection: Collection,
        id: i64,
        body: &Value,
    ) -> Result<Value, RemoteError>;

    async fn delete(
        &self,
        base: &ServerUrl,
        collection: Collection,
        id: i64,
    ) -> Result<(), RemoteError>;

    async fn lock_query(&self, base: &ServerUrl, entity_id: i64)
        -> Result<LockState, RemoteError>;

    /// Fails with [`RemoteError::Conflict`] when another device holds the lock.
    async fn lock_acquire(
        &self,
        base: &ServerUrl,
        entity_id: i64,
        holder_device: &str,
    ) -> Result<LockState, RemoteError>;

    async fn lock_release(
        &self,
        base: &ServerUrl,
        entity_id: i64,
        holder_device: &str,
    ) -> Result<(), RemoteError>;
}
