//! Change notifications for observable queries.
//!
//! Every repository write publishes the table it touched on a broadcast
//! channel. A [`LiveQuery`] re-runs its query each time its table changes,
//! giving UI layers a live result set without polling.

use futures::future::BoxFuture;
use tokio::sync::broadcast;

use super::StoreError;

const CHANGE_FEED_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Repairs,
    WarehouseItems,
    Transactions,
    Preferences,
}

#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<Table>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { tx }
    }

    pub fn notify(&self, table: Table) {
        // No subscribers is fine.
        let _ = self.tx.send(table);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Table> {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

type Fetch<T> = Box<dyn Fn() -> BoxFuture<'static, Result<T, StoreError>> + Send + Sync>;

/// A query result that refreshes whenever its table is written.
pub struct LiveQuery<T> {
    table: Table,
    rx: broadcast::Receiver<Table>,
    fetch: Fetch<T>,
    primed: bool,
}

impl<T> LiveQuery<T> {
    pub fn new<F>(table: Table, feed: &ChangeFeed, fetch: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<T, StoreError>> + Send + Sync + 'static,
    {
        Self {
            table,
            rx: feed.subscribe(),
            fetch: Box::new(fetch),
            primed: false,
        }
    }

    /// Returns the current result immediately, then one fresh result per
    /// change to the table. `None` once the store is gone.
    pub async fn next(&mut self) -> Option<Result<T, StoreError>> {
        if !self.primed {
            self.primed = true;
            return Some((self.fetch)().await);
        }

        loop {
            match self.rx.recv().await {
                Ok(table) if table == self.table => return Some((self.fetch)().await),
                Ok(_) => continue,
                // Missed notifications; re-query to catch up.
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    return Some((self.fetch)().await)
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
