//! Reference implementation of the remote service the sync engine talks to.
//!
//! It keeps everything in memory and is meant for LAN deployments and
//! integration tests, not as a system of record.

mod routes;
pub mod storage;

pub use routes::router;
pub use storage::{RemoteStore, StorageError};
