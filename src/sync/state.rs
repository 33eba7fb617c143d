//! In-memory sync policy state.
//!
//! Owned by the orchestrator behind a mutex; everyone else sees it through
//! [`SyncStatus`] snapshots on a watch channel. Nothing here is persisted,
//! so a restarted process starts online and idle.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

use super::error::{SkipReason, SyncError};

/// Consecutive escalated failures before offline mode is forced on.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Minimum spacing between non-forced runs.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPolicy {
    pub interval: Duration,
    pub failure_threshold: u32,
    pub page_size: u32,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            interval: SYNC_INTERVAL,
            failure_threshold: FAILURE_THRESHOLD,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Read-only view of the sync state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
    pub offline_mode: bool,
    pub is_syncing: bool,
    pub creating_repair: bool,
    pub failure_count: u32,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct SyncState {
    offline_mode: bool,
    failure_count: u32,
    // Forced runs may overlap a running one, so this is a count, not a flag.
    active_runs: u32,
    last_sync: Option<Instant>,
    last_sync_time: Option<DateTime<Utc>>,
    creating_repair_guard: bool,
    creations_in_flight: u32,
    last_error: Option<String>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_syncing(&self) -> bool {
        self.active_runs > 0
    }

    pub fn is_offline(&self) -> bool {
        self.offline_mode
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// In-memory part of the eligibility gate, checked in order.
    pub fn check_gate(
        &self,
        forced: bool,
        now: Instant,
        policy: &SyncPolicy,
    ) -> Result<(), SkipReason> {
        if self.offline_mode {
            return Err(SkipReason::Offline);
        }
        if forced {
            return Ok(());
        }
        if self.is_syncing() {
            return Err(SkipReason::AlreadySyncing);
        }
        if self.is_creating_repair() {
            return Err(SkipReason::CreatingRepair);
        }
        if let Some(last) = self.last_sync {
            if now.saturating_duration_since(last) < policy.interval {
                return Err(SkipReason::TooSoon);
            }
        }
        Ok(())
    }

    pub fn begin_run(&mut self, now: Instant, wall_clock: DateTime<Utc>) {
        self.active_runs += 1;
        self.last_sync = Some(now);
        self.last_sync_time = Some(wall_clock);
    }

    pub fn end_run(&mut self) {
        self.active_runs = self.active_runs.saturating_sub(1);
    }

    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.last_error = None;
    }

    /// Records an escalated failure. Returns true when this failure switched
    /// offline mode on.
    pub fn record_failure(&mut self, error: &SyncError, threshold: u32) -> bool {
        self.last_error = Some(error.to_string());
        if !error.is_counted() {
            return false;
        }
        self.failure_count += 1;
        if self.failure_count >= threshold && !self.offline_mode {
            self.offline_mode = true;
            return true;
        }
        false
    }

    /// Switching offline mode off also clears the failure count.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline_mode = offline;
        if !offline {
            self.failure_count = 0;
        }
    }

    /// Explicit guard, independent of creations tracked by `begin_create`.
    pub fn set_creating_repair(&mut self, creating: bool) {
        self.creating_repair_guard = creating;
    }

    pub fn begin_create(&mut self) {
        self.creations_in_flight += 1;
    }

    pub fn end_create(&mut self) {
        self.creations_in_flight = self.creations_in_flight.saturating_sub(1);
    }

    pub fn is_creating_repair(&self) -> bool {
        self.creating_repair_guard || self.creations_in_flight > 0
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            offline_mode: self.offline_mode,
            is_syncing: self.is_syncing(),
            creating_repair: self.is_creating_repair(),
            failure_count: self.failure_count,
            last_sync_time: self.last_sync_time,
            last_error: self.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_error() -> SyncError {
        SyncError::Network("connection refused".to_string())
    }

    #[test]
    fn test_threshold_trips_on_third_failure() {
        let mut state = SyncState::new();
        for n in 1..=2 {
            assert!(!state.record_failure(&network_error(), FAILURE_THRESHOLD));
            assert_eq!(state.failure_count(), n);
            assert!(!state.is_offline());
        }
        assert!(state.record_failure(&network_error(), FAILURE_THRESHOLD));
        assert!(state.is_offline());
    }

    #[test]
    fn test_uncounted_failure_keeps_count() {
        let mut state = SyncState::new();
        state.record_failure(&SyncError::Offline, FAILURE_THRESHOLD);
        assert_eq!(state.failure_count(), 0);
        assert_eq!(state.status().last_error.as_deref(), Some("Offline mode is on"));
    }

    #[test]
    fn test_success_resets() {
        let mut state = SyncState::new();
        state.record_failure(&network_error(), FAILURE_THRESHOLD);
        state.record_failure(&network_error(), FAILURE_THRESHOLD);
        state.record_success();
        assert_eq!(state.failure_count(), 0);
        assert!(state.status().last_error.is_none());
    }

    #[test]
    fn test_gate_order() {
        let policy = SyncPolicy::default();
        let now = Instant::now();
        let mut state = SyncState::new();
        assert_eq!(state.check_gate(false, now, &policy), Ok(()));

        state.begin_run(now, Utc::now());
        state.set_creating_repair(true);
        assert_eq!(
            state.check_gate(false, now, &policy),
            Err(SkipReason::AlreadySyncing)
        );
        assert_eq!(state.check_gate(true, now, &policy), Ok(()));

        state.end_run();
        assert_eq!(
            state.check_gate(false, now, &policy),
            Err(SkipReason::CreatingRepair)
        );

        state.set_creating_repair(false);
        assert_eq!(state.check_gate(false, now, &policy), Err(SkipReason::TooSoon));
        assert_eq!(
            state.check_gate(false, now + SYNC_INTERVAL, &policy),
            Ok(())
        );

        state.set_offline(true);
        assert_eq!(state.check_gate(true, now, &policy), Err(SkipReason::Offline));
    }

    #[test]
    fn test_overlapping_creations_hold_guard() {
        let mut state = SyncState::new();
        state.begin_create();
        state.begin_create();
        state.end_create();
        assert!(state.status().creating_repair);
        assert_eq!(
            state.check_gate(false, Instant::now(), &SyncPolicy::default()),
            Err(SkipReason::CreatingRepair)
        );
        state.end_create();
        assert!(!state.status().creating_repair);
    }

    #[test]
    fn test_overlapping_runs() {
        let mut state = SyncState::new();
        let now = Instant::now();
        state.begin_run(now, Utc::now());
        state.begin_run(now, Utc::now());
        state.end_run();
        assert!(state.is_syncing());
        state.end_run();
        assert!(!state.is_syncing());
    }

    #[test]
    fn test_leaving_offline_clears_failures() {
        let mut state = SyncState::new();
        for _ in 0..3 {
            state.record_failure(&network_error(), FAILURE_THRESHOLD);
        }
        assert!(state.is_offline());
        state.set_offline(false);
        assert!(!state.is_offline());
        assert_eq!(state.failure_count(), 0);
    }
}
