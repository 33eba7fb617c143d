use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::SyncableRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Income => write!(f, "income"),
            TransactionKind::Expense => write!(f, "expense"),
        }
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "income" | "in" => Ok(TransactionKind::Income),
            "expense" | "out" => Ok(TransactionKind::Expense),
            _ => Err(format!(
                "Invalid transaction kind '{}'. Valid options: income, expense",
                s
            )),
        }
    }
}

/// A cash register movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub remote_id: Option<i64>,
    pub kind: TransactionKind,
    pub amount: f64,
    pub description: String,
    pub category: String,
    /// Receipt number of the repair this payment belongs to, if any.
    pub repair_receipt: Option<i64>,
    pub occurred_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub synced: bool,
}

impl Transaction {
    pub fn new(kind: TransactionKind, amount: f64, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            remote_id: None,
            kind,
            amount,
            description: description.into(),
            category: String::new(),
            repair_receipt: None,
            occurred_at: now,
            last_modified: now,
            synced: false,
        }
    }

    /// Amount with sign applied: expenses are negative.
    pub fn signed_amount(&self) -> f64 {
        match self.kind {
            TransactionKind::Income => self.amount,
            TransactionKind::Expense => -self.amount,
        }
    }
}

impl SyncableRecord for Transaction {
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
}
