use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SyncableRecord;

/// A spare part or consumable on the warehouse shelf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseItem {
    pub id: i64,
    pub remote_id: Option<i64>,
    pub name: String,
    /// Article / SKU printed on the label.
    pub sku: String,
    pub category: String,
    pub quantity: i64,
    pub price: f64,
    pub location: String,
    pub last_modified: DateTime<Utc>,
    pub synced: bool,
}

impl WarehouseItem {
    pub fn new(name: impl Into<String>, sku: impl Into<String>) -> Self {
        Self {
            id: 0,
            remote_id: None,
            name: name.into(),
            sku: sku.into(),
            category: String::new(),
            quantity: 0,
            price: 0.0,
            location: String::new(),
            last_modified: Utc::now(),
            synced: false,
        }
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    pub fn stock_value(&self) -> f64 {
        self.price * self.quantity as f64
    }
}

impl SyncableRecord for WarehouseItem {
    fn local_id(&self) -> i64 {
        self.id
    }

    fn remote_id(&self) -> Option<i64> {
        self.remote_id
    }

    fn is_synced(&self) -> bool {
        self.synced
    }

    fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    fn business_key(&self) -> Option<String> {
        if self.sku.is_empty() {
            None
        } else {
            Some(self.sku.clone())
        }
    }
}
