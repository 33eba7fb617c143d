//! In-memory record and lock storage for the reference remote service.
//!
//! Records are kept as JSON objects per collection, keyed by the id the
//! store assigns on create. Locks are keyed by entity id and are shared by
//! all collections.

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

use crate::remote::{Collection, ListPage, ListQuery, LockState};

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Request body was not a JSON object.
    InvalidBody(String),
    /// No record with that id.
    NotFound(Collection, i64),
    /// The lock is held by another device.
    Locked(LockState),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::InvalidBody(e) => write!(f, "Invalid body: {}", e),
            StorageError::NotFound(collection, id) => {
                write!(f, "No {} record with id {}", collection, id)
            }
            StorageError::Locked(state) => write!(
                f,
                "Locked by {}",
                state.holder_device.as_deref().unwrap_or("unknown")
            ),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<Collection, BTreeMap<i64, Map<String, Value>>>,
    next_id: i64,
    locks: HashMap<i64, LockState>,
}

/// Thread-safe in-memory storage.
#[derive(Debug, Default)]
pub struct RemoteStore {
    inner: RwLock<Inner>,
}

impl RemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lists matching records, oldest id first.
    ///
    /// Without a `page`/`limit` the whole match set comes back as one page.
    pub fn list(&self, collection: Collection, query: &ListQuery) -> ListPage {
        let inner = self.inner.read();
        let matching: Vec<Value> = inner
            .records
            .get(&collection)
            .into_iter()
            .flat_map(|records| records.values())
            .filter(|record| matches_query(record, query))
            .map(|record| Value::Object(record.clone()))
            .collect();

        if query.page.is_none() && query.limit.is_none() {
            return ListPage::single(matching);
        }

        let limit = query.limit.unwrap_or(50).max(1) as usize;
        let page = query.page.unwrap_or(1).max(1);
        let total_pages = matching.len().div_ceil(limit).max(1) as u32;
        let items = matching
            .into_iter()
            .skip((page as usize - 1) * limit)
            .take(limit)
            .collect();

        ListPage {
            items,
            page,
            total_pages,
        }
    }

    pub fn get(&self, collection: Collection, id: i64) -> Option<Value> {
        self.inner
            .read()
            .records
            .get(&collection)
            .and_then(|records| records.get(&id))
            .map(|record| Value::Object(record.clone()))
    }

    /// Stores a new record under a fresh id. Any client-supplied id is ignored.
    pub fn create(&self, collection: Collection, body: Value) -> Result<Value, StorageError> {
        let mut record = into_object(body)?;
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let id = inner.next_id;

        record.insert("id".to_string(), Value::from(id));
        stamp(&mut record);
        inner
            .records
            .entry(collection)
            .or_default()
            .insert(id, record.clone());

        Ok(Value::Object(record))
    }

    /// Merges `body` into an existing record.
    pub fn update(&self, collection: Collection, id: i64, body: Value) -> Result<Value, StorageError> {
        let changes = into_object(body)?;
        let mut inner = self.inner.write();
        let record = inner
            .records
            .get_mut(&collection)
            .and_then(|records| records.get_mut(&id))
            .ok_or(StorageError::NotFound(collection, id))?;

        for (key, value) in changes {
            if key != "id" {
                record.insert(key, value);
            }
        }
        stamp(record);
        Ok(Value::Object(record.clone()))
    }

    pub fn delete(&self, collection: Collection, id: i64) -> Result<(), StorageError> {
        self.inner
            .write()
            .records
            .get_mut(&collection)
            .and_then(|records| records.remove(&id))
            .map(|_| ())
            .ok_or(StorageError::NotFound(collection, id))
    }

    pub fn lock_state(&self, entity_id: i64) -> LockState {
        self.inner
            .read()
            .locks
            .get(&entity_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Takes the lock for `device`. Re-acquiring refreshes `acquired_at`.
    pub fn acquire_lock(&self, entity_id: i64, device: &str) -> Result<LockState, StorageError> {
        let mut inner = self.inner.write();
        if let Some(current) = inner.locks.get(&entity_id) {
            if current.is_held_by_other(device) {
                return Err(StorageError::Locked(current.clone()));
            }
        }

        let state = LockState::held_by(device, Utc::now());
        inner.locks.insert(entity_id, state.clone());
        Ok(state)
    }

    /// Releasing a free lock succeeds; releasing someone else's does not.
    pub fn release_lock(&self, entity_id: i64, device: &str) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        match inner.locks.get(&entity_id) {
            Some(current) if current.is_held_by_other(device) => {
                Err(StorageError::Locked(current.clone()))
            }
            _ => {
                inner.locks.remove(&entity_id);
                Ok(())
            }
        }
    }

    pub fn count(&self, collection: Collection) -> usize {
        self.inner
            .read()
            .records
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }
}

fn into_object(body: Value) -> Result<Map<String, Value>, StorageError> {
    match body {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::InvalidBody(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

fn stamp(record: &mut Map<String, Value>) {
    record.insert(
        "updated_at".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
}

fn field_str(record: &Map<String, Value>, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn record_date(record: &Map<String, Value>) -> Option<String> {
    ["occurred_at", "created_at", "date"]
        .iter()
        .find_map(|key| field_str(record, key))
}

fn matches_query(record: &Map<String, Value>, query: &ListQuery) -> bool {
    if let Some(receipt) = query.receipt_number {
        let found = field_str(record, "receipt_number").and_then(|r| r.parse::<i64>().ok());
        if found != Some(receipt) {
            return false;
        }
    }
    if let Some(status) = &query.status {
        if field_str(record, "status").as_deref() != Some(status.as_str()) {
            return false;
        }
    }
    if let Some(executor) = &query.executor {
        if field_str(record, "executor").as_deref() != Some(executor.as_str()) {
            return false;
        }
    }
    // Dates compare as text; RFC 3339 and YYYY-MM-DD order correctly.
    if let Some(from) = &query.date_from {
        match record_date(record) {
            Some(date) if date.as_str() >= from.as_str() => {}
            _ => return false,
        }
    }
    if let Some(to) = &query.date_to {
        match record_date(record) {
            Some(date) if date.get(..to.len()).unwrap_or(date.as_str()) <= to.as_str() => {}
            _ => return false,
        }
    }
    if let Some(search) = &query.search {
        let needle = search.to_lowercase();
        let hit = record.values().any(|value| match value {
            Value::String(s) => s.to_lowercase().contains(&needle),
            Value::Number(n) => n.to_string().contains(&needle),
            _ => false,
        });
        if !hit {
            return false;
        }
    }
    true
}
