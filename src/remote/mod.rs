//! Remote service client side.
//!
//! [`RemoteGateway`] is the seam between the sync engine and the wire:
//! [`HttpGateway`] talks to a real server, tests substitute fakes.

#[cfg(test)]
pub(crate) mod fake;
mod gateway;
mod http;
mod lock;
pub mod payload;
mod url;

pub use gateway::RemoteGateway;
pub use http::{GatewayTimeouts, HttpGateway};
pub use lock::{LockClient, LockError, ReleaseOutcome};
pub use url::ServerUrl;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote collections the client synchronises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Repairs,
    WarehouseItems,
    Transactions,
}

impl Collection {
    pub fn path(&self) -> &'static str {
        match self {
            Collection::Repairs => "repairs",
            Collection::WarehouseItems => "warehouse-items",
            Collection::Transactions => "transactions",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "repairs" => Some(Collection::Repairs),
            "warehouse-items" => Some(Collection::WarehouseItems),
            "transactions" => Some(Collection::Transactions),
            _ => None,
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// Errors from remote calls.
#[derive(Debug, Clone)]
pub enum RemoteError {
    /// Timeout, refused connection, DNS failure...
    Network(String),
    /// The server answered with a failure status.
    Server { status: u16, message: String },
    /// A lock is held by another device.
    Conflict(LockState),
    /// The response body could not be decoded.
    Decode(String),
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::Network(e) => write!(f, "Network error: {}", e),
            RemoteError::Server { status, message } if message.is_empty() => {
                write!(f, "Server returned status {}", status)
            }
            RemoteError::Server { status, message } => {
                write!(f, "Server returned status {}: {}", status, message)
            }
            RemoteError::Conflict(state) => write!(
                f,
                "Locked by another device ({})",
                state.holder_device.as_deref().unwrap_or("unknown")
            ),
            RemoteError::Decode(e) => write!(f, "Invalid response: {}", e),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Remote-owned edit lock on one entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LockState {
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub holder_device: Option<String>,
    #[serde(default)]
    pub acquired_at: Option<DateTime<Utc>>,
}

impl LockState {
    pub fn unlocked() -> Self {
        Self::default()
    }

    pub fn held_by(device: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            locked: true,
            holder_device: Some(device.into()),
            acquired_at: Some(at),
        }
    }

    pub fn is_held_by(&self, device: &str) -> bool {
        self.locked && self.holder_device.as_deref() == Some(device)
    }

    pub fn is_held_by_other(&self, device: &str) -> bool {
        self.locked && !self.is_held_by(device)
    }
}

/// Filter and pagination parameters for collection fetches.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub executor: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub receipt_number: Option<i64>,
}

impl ListQuery {
    pub fn page(page: u32, limit: u32) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn by_receipt(receipt_number: i64) -> Self {
        Self {
            receipt_number: Some(receipt_number),
            ..Self::default()
        }
    }

    /// Query-string pairs, omitting unset filters.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(search) = &self.search {
            pairs.push(("search", search.clone()));
        }
        if let Some(status) = &self.status {
            pairs.push(("status", status.clone()));
        }
        if let Some(executor) = &self.executor {
            pairs.push(("executor", executor.clone()));
        }
        if let Some(date_from) = &self.date_from {
            pairs.push(("date_from", date_from.clone()));
        }
        if let Some(date_to) = &self.date_to {
            pairs.push(("date_to", date_to.clone()));
        }
        if let Some(receipt) = self.receipt_number {
            pairs.push(("receipt_number", receipt.to_string()));
        }
        pairs
    }
}

/// One page of a collection fetch.
///
/// Servers answer either with a flat array (everything, one page) or with a
/// `{ "items": [...], "page": n, "total_pages": m }` envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    pub items: Vec<Value>,
    pub page: u32,
    pub total_pages: u32,
}

impl ListPage {
    pub fn single(items: Vec<Value>) -> Self {
        Self {
            items,
            page: 1,
            total_pages: 1,
        }
    }

    pub fn from_value(value: Value) -> Result<Self, RemoteError> {
        match value {
            Value::Array(items) => Ok(Self::single(items)),
            Value::Object(mut obj) => {
                let items = match obj.remove("items").or_else(|| obj.remove("data")) {
                    Some(Value::Array(items)) => items,
                    Some(Value::Null) | None => Vec::new(),
                    Some(other) => {
                        return Err(RemoteError::Decode(format!(
                            "expected an item array, got {}",
                            other
                        )))
                    }
                };
                let as_u32 = |v: Option<&Value>| {
                    v.and_then(Value::as_u64)
                        .map(|n| n.min(u32::MAX as u64) as u32)
                };
                let page = as_u32(obj.get("page")).unwrap_or(1).max(1);
                let total_pages = as_u32(obj.get("total_pages"))
                    .unwrap_or(page)
                    .max(page);
                Ok(Self {
                    items,
                    page,
                    total_pages,
                })
            }
            other => Err(RemoteError::Decode(format!(
                "expected a list payload, got {}",
                other
            ))),
        }
    }

    pub fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}

/// Answer of the health probe.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HealthInfo {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_list_is_single_page() {
        let page = ListPage::from_value(json!([{"id": 1}, {"id": 2}])).unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(!page.has_more());
    }

    #[test]
    fn test_paginated_envelope() {
        let page =
            ListPage::from_value(json!({"items": [{"id": 1}], "page": 1, "total_pages": 3}))
                .unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.has_more());
    }

    #[test]
    fn test_envelope_without_items() {
        let page = ListPage::from_value(json!({"page": 2})).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.page, 2);
        assert!(!page.has_more());
    }

    #[test]
    fn test_scalar_payload_rejected() {
        assert!(matches!(
            ListPage::from_value(json!("nope")),
            Err(RemoteError::Decode(_))
        ));
    }

    #[test]
    fn test_query_pairs() {
        let mut query = ListQuery::page(2, 50);
        query.status = Some("ready".to_string());
        assert_eq!(
            query.to_pairs(),
            vec![
                ("page", "2".to_string()),
                ("limit", "50".to_string()),
                ("status", "ready".to_string()),
            ]
        );
        assert_eq!(
            ListQuery::by_receipt(77).to_pairs(),
            vec![("receipt_number", "77".to_string())]
        );
    }

    #[test]
    fn test_lock_state_holders() {
        let state = LockState::held_by("tablet-a", Utc::now());
        assert!(state.is_held_by("tablet-a"));
        assert!(state.is_held_by_other("tablet-b"));
        assert!(!LockState::unlocked().is_held_by_other("tablet-b"));
    }
}
