//! Offline-first sync engine for a repair shop.
//!
//! Repair tickets, warehouse parts and cash transactions live in a local
//! SQLite store and are reconciled against a remote service whenever the
//! network allows. See [`sync::SyncOrchestrator`] for the policy and
//! [`server`] for the reference remote service.

pub mod config;
pub mod db;
pub mod models;
pub mod remote;
pub mod server;
pub mod sync;

/// Crate version, as reported by `/health` and `--version`.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
