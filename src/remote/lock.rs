//! Cooperative edit locks on repair tickets.
//!
//! A lock is owned by the remote service. The client only asks for it,
//! inspects it and gives it back; expiry of abandoned locks is the server's
//! business.

use std::sync::Arc;

use super::gateway::RemoteGateway;
use super::{LockState, RemoteError, ServerUrl};
use crate::db::{PreferenceStore, StoreError};

/// Errors from lock operations.
#[derive(Debug)]
pub enum LockError {
    /// No server URL is configured.
    NotConfigured,
    /// The sync engine is in offline mode.
    Offline,
    /// Another device holds the lock.
    HeldByOther(LockState),
    /// The remote call failed.
    Remote(RemoteError),
    /// Reading the server URL failed.
    Store(StoreError),
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockError::NotConfigured => write!(f, "No server configured"),
            LockError::Offline => write!(f, "Offline mode is on"),
            LockError::HeldByOther(state) => write!(
                f,
                "Locked by device {}",
                state.holder_device.as_deref().unwrap_or("unknown")
            ),
            LockError::Remote(e) => write!(f, "{}", e),
            LockError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for LockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LockError::Remote(e) => Some(e),
            LockError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RemoteError> for LockError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Conflict(state) => LockError::HeldByOther(state),
            other => LockError::Remote(other),
        }
    }
}

impl From<StoreError> for LockError {
    fn from(e: StoreError) -> Self {
        LockError::Store(e)
    }
}

/// Result of a best-effort release.
#[derive(Debug)]
pub enum ReleaseOutcome {
    Released,
    /// The release failed and the error was logged and swallowed.
    Absorbed(LockError),
}

impl ReleaseOutcome {
    pub fn is_released(&self) -> bool {
        matches!(self, ReleaseOutcome::Released)
    }
}

#[derive(Clone)]
pub struct LockClient {
    gateway: Arc<dyn RemoteGateway>,
    preferences: PreferenceStore,
}

impl LockClient {
    pub fn new(gateway: Arc<dyn RemoteGateway>, preferences: PreferenceStore) -> Self {
        Self {
            gateway,
            preferences,
        }
    }

    async fn base(&self) -> Result<ServerUrl, LockError> {
        self.preferences
            .server_url()
            .await?
            .ok_or(LockError::NotConfigured)
    }

    /// Takes the lock, or refreshes it when `holder` already has it.
    pub async fn acquire(&self, entity_id: i64, holder: &str) -> Result<LockState, LockError> {
        let base = self.base().await?;
        let state = self.gateway.lock_acquire(&base, entity_id, holder).await?;
        if state.is_held_by_other(holder) {
            return Err(LockError::HeldByOther(state));
        }
        tracing::debug!("Acquired lock on {} for {}", entity_id, holder);
        Ok(state)
    }

    pub async fn query(&self, entity_id: i64) -> Result<LockState, LockError> {
        let base = self.base().await?;
        Ok(self.gateway.lock_query(&base, entity_id).await?)
    }

    pub async fn release(&self, entity_id: i64, holder: &str) -> Result<(), LockError> {
        let base = self.base().await?;
        self.gateway.lock_release(&base, entity_id, holder).await?;
        tracing::debug!("Released lock on {} for {}", entity_id, holder);
        Ok(())
    }

    /// Like [`release`](Self::release) but never fails.
    pub async fn release_best_effort(&self, entity_id: i64, holder: &str) -> ReleaseOutcome {
        match self.release(entity_id, holder).await {
            Ok(()) => ReleaseOutcome::Released,
            Err(e) => {
                tracing::warn!("Failed to release lock on {}: {}", entity_id, e);
                ReleaseOutcome::Absorbed(e)
            }
        }
    }
}
