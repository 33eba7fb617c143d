//! Sync error taxonomy and run outcomes.

use std::fmt;

use crate::db::StoreError;
use crate::remote::{Collection, LockState, RemoteError};

use super::reconcile::ReconcileReport;

/// Errors raised by a sync run or one of its phases.
#[derive(Debug)]
pub enum SyncError {
    /// The network is down; nothing was attempted.
    Unreachable,
    /// No server URL is configured.
    NotConfigured,
    /// Offline mode was switched on.
    Offline,
    /// Timeout, refused connection and the like.
    Network(String),
    /// The server answered with a failure status.
    Server { status: u16, message: String },
    /// A lock is held by another device.
    Conflict(LockState),
    /// The server answered with something unreadable.
    Decode(String),
    /// Local store failure.
    Store(StoreError),
}

impl SyncError {
    /// Whether this error counts toward the offline-mode threshold when it
    /// aborts a run.
    pub fn is_counted(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_)
                | SyncError::Server { .. }
                | SyncError::Decode(_)
                | SyncError::Store(_)
        )
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Unreachable => write!(f, "Network unreachable"),
            SyncError::NotConfigured => {
                write!(f, "Sync not configured. Set a server URL first.")
            }
            SyncError::Offline => write!(f, "Offline mode is on"),
            SyncError::Network(e) => write!(f, "Network error: {}", e),
            SyncError::Server { status, message } if message.is_empty() => {
                write!(f, "Server error ({})", status)
            }
            SyncError::Server { status, message } => {
                write!(f, "Server error ({}): {}", status, message)
            }
            SyncError::Conflict(state) => write!(
                f,
                "Locked by device {}",
                state.holder_device.as_deref().unwrap_or("unknown")
            ),
            SyncError::Decode(e) => write!(f, "Invalid server response: {}", e),
            SyncError::Store(e) => write!(f, "Local store error: {}", e),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RemoteError> for SyncError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Network(msg) => SyncError::Network(msg),
            RemoteError::Server { status, message } => SyncError::Server { status, message },
            RemoteError::Conflict(state) => SyncError::Conflict(state),
            RemoteError::Decode(msg) => SyncError::Decode(msg),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::Store(e)
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Startup,
    Connectivity,
    Periodic,
    /// Explicit user refresh.
    Manual,
    /// Leaving offline mode.
    Retry,
}

impl SyncTrigger {
    /// Forced runs bypass the concurrency, creation-guard and interval gates.
    pub fn is_forced(self) -> bool {
        matches!(self, SyncTrigger::Manual | SyncTrigger::Retry)
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncTrigger::Startup => "startup",
            SyncTrigger::Connectivity => "connectivity",
            SyncTrigger::Periodic => "periodic",
            SyncTrigger::Manual => "manual",
            SyncTrigger::Retry => "retry",
        };
        write!(f, "{}", name)
    }
}

/// Why a run did not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    AlreadySyncing,
    CreatingRepair,
    TooSoon,
    NotConfigured,
    Unreachable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::Offline => "offline mode",
            SkipReason::AlreadySyncing => "another sync is running",
            SkipReason::CreatingRepair => "a repair is being created",
            SkipReason::TooSoon => "last sync was too recent",
            SkipReason::NotConfigured => "no server configured",
            SkipReason::Unreachable => "network unreachable",
        };
        write!(f, "{}", reason)
    }
}

/// A phase failure that was logged and swallowed instead of failing the run.
#[derive(Debug)]
pub struct AbsorbedError {
    pub collection: Collection,
    pub error: SyncError,
}

/// Per-collection results of a completed run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub repairs: ReconcileReport,
    pub warehouse: Option<ReconcileReport>,
    pub transactions: Option<ReconcileReport>,
}

#[derive(Debug)]
pub enum RunOutcome {
    Skipped(SkipReason),
    Completed {
        report: RunReport,
        absorbed: Vec<AbsorbedError>,
    },
    /// The escalated phase failed; the error was counted if [`SyncError::is_counted`].
    Failed(SyncError),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            RunOutcome::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }
}
