use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::repair_status::RepairStatus;
use super::SyncableRecord;

/// A repair ticket.
///
/// `id` is the local row id and means nothing to the remote; `remote_id` is
/// filled in once the server has acknowledged the ticket. The receipt number
/// is the business key both sides agree on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repair {
    pub id: i64,
    pub remote_id: Option<i64>,
    pub receipt_number: i64,
    pub client_name: String,
    pub client_phone: String,
    pub device: String,
    pub problem: String,
    /// Long-form status label, see [`RepairStatus::label`].
    pub status: String,
    pub executor: String,
    pub cost: f64,
    pub prepayment: f64,
    pub urgent: bool,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub synced: bool,
}

impl Repair {
    pub fn new(
        receipt_number: i64,
        client_name: impl Into<String>,
        device: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            remote_id: None,
            receipt_number,
            client_name: client_name.into(),
            client_phone: String::new(),
            device: device.into(),
            problem: String::new(),
            status: RepairStatus::Queued.label().to_string(),
            executor: String::new(),
            cost: 0.0,
            prepayment: 0.0,
            urgent: false,
            created_at: now,
            last_modified: now,
            synced: false,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.client_phone = phone.into();
        self
    }

    pub fn with_problem(mut self, problem: impl Into<String>) -> Self {
        self.problem = problem.into();
        self
    }

    pub fn with_executor(mut self, executor: impl Into<String>) -> Self {
        self.executor = executor.into();
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_status(mut self, status: RepairStatus) -> Self {
        self.status = status.label().to_string();
        self
    }

    /// Amount the client still owes on pickup.
    pub fn balance_due(&self) -> f64 {
        (self.cost - self.prepayment).max(0.0)
    }
}

impl SyncableRecord for Repair {
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
        Some(self.receipt_number.to_string())
    }
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = format!("Receipt #{}", self.receipt_number);
        writeln!(f, "{}", title)?;
        writeln!(f, "{}", "=".repeat(title.len()))?;
        writeln!(f, "Client: {}", self.client_name)?;
        if !self.client_phone.is_empty() {
            writeln!(f, "Phone: {}", self.client_phone)?;
        }
        writeln!(f, "Device: {}", self.device)?;
        if !self.problem.is_empty() {
            writeln!(f, "Problem: {}", self.problem)?;
        }
        writeln!(f, "Status: {}", self.status)?;
        if !self.executor.is_empty() {
            writeln!(f, "Executor: {}", self.executor)?;
        }
        writeln!(f, "Cost: {:.2} (due {:.2})", self.cost, self.balance_due())?;
        write!(
            f,
            "Sync: {}",
            if self.synced { "synced" } else { "pending" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_new() {
        let repair = Repair::new(77, "Ann", "Pixel 6");
        assert_eq!(repair.receipt_number, 77);
        assert_eq!(repair.status, "Queued");
        assert!(!repair.synced);
        assert!(repair.remote_id.is_none());
    }

    #[test]
    fn test_balance_due() {
        let mut repair = Repair::new(1, "Ann", "Pixel 6").with_cost(120.0);
        repair.prepayment = 50.0;
        assert_eq!(repair.balance_due(), 70.0);

        repair.prepayment = 200.0;
        assert_eq!(repair.balance_due(), 0.0);
    }

    #[test]
    fn test_business_key_is_receipt() {
        let repair = Repair::new(77, "Ann", "Pixel 6");
        assert_eq!(repair.business_key(), Some("77".to_string()));
    }

    #[test]
    fn test_display() {
        let repair = Repair::new(12, "Bob", "iPhone 12")
            .with_status(RepairStatus::Ready)
            .with_cost(80.0);
        let output = repair.to_string();
        assert!(output.contains("Receipt #12"));
        assert!(output.contains("Ready for pickup"));
        assert!(output.contains("pending"));
    }
}
