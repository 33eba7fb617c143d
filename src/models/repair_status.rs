//! Repair status vocabulary.
//!
//! Locally a repair carries a long human-readable label ("Waiting for parts").
//! The remote speaks compact machine codes: a short token (`waiting_parts`),
//! a number (`3`) or one of the legacy aliases older servers still emit.
//! [`StatusCode`] is the total mapping between the two; anything it does not
//! recognise is carried through verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    Queued,
    Diagnostics,
    InProgress,
    WaitingParts,
    Ready,
    Issued,
    Cancelled,
}

impl RepairStatus {
    pub const ALL: [RepairStatus; 7] = [
        RepairStatus::Queued,
        RepairStatus::Diagnostics,
        RepairStatus::InProgress,
        RepairStatus::WaitingParts,
        RepairStatus::Ready,
        RepairStatus::Issued,
        RepairStatus::Cancelled,
    ];

    /// Canonical token sent to the remote.
    pub fn code(self) -> &'static str {
        match self {
            RepairStatus::Queued => "queued",
            RepairStatus::Diagnostics => "diagnostics",
            RepairStatus::InProgress => "in_progress",
            RepairStatus::WaitingParts => "waiting_parts",
            RepairStatus::Ready => "ready",
            RepairStatus::Issued => "issued",
            RepairStatus::Cancelled => "cancelled",
        }
    }

    /// Numeric form used by the oldest server builds.
    pub fn numeric(self) -> i64 {
        match self {
            RepairStatus::Queued => 0,
            RepairStatus::Diagnostics => 1,
            RepairStatus::InProgress => 2,
            RepairStatus::WaitingParts => 3,
            RepairStatus::Ready => 4,
            RepairStatus::Issued => 5,
            RepairStatus::Cancelled => 6,
        }
    }

    /// Human-readable label stored locally and shown to staff.
    pub fn label(self) -> &'static str {
        match self {
            RepairStatus::Queued => "Queued",
            RepairStatus::Diagnostics => "Diagnostics",
            RepairStatus::InProgress => "In progress",
            RepairStatus::WaitingParts => "Waiting for parts",
            RepairStatus::Ready => "Ready for pickup",
            RepairStatus::Issued => "Issued to client",
            RepairStatus::Cancelled => "Cancelled",
        }
    }

    pub fn from_numeric(n: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.numeric() == n)
    }

    /// Accepts the canonical token, a legacy alias or a numeric string.
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_lowercase();
        if let Ok(n) = code.parse::<i64>() {
            return Self::from_numeric(n);
        }
        match code.as_str() {
            "queued" | "new" | "pending" => Some(RepairStatus::Queued),
            "diagnostics" | "diagnosis" => Some(RepairStatus::Diagnostics),
            "in_progress" | "inprogress" | "in-progress" | "repair" => {
                Some(RepairStatus::InProgress)
            }
            "waiting_parts" | "waiting_for_parts" | "parts" => Some(RepairStatus::WaitingParts),
            "ready" | "done" => Some(RepairStatus::Ready),
            "issued" | "completed" | "closed" => Some(RepairStatus::Issued),
            "cancelled" | "canceled" | "refused" => Some(RepairStatus::Cancelled),
            _ => None,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for RepairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for RepairStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s)
            .or_else(|| Self::from_code(s))
            .ok_or_else(|| {
                format!(
                    "Invalid status '{}'. Valid options: {}",
                    s,
                    Self::ALL.map(|st| st.code()).join(", ")
                )
            })
    }
}

/// A status as exchanged with the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCode {
    Known(RepairStatus),
    /// Forward-incompatible value, kept exactly as received.
    Unknown(String),
}

impl StatusCode {
    /// Decodes the remote `status` field. Missing, null or blank means queued.
    pub fn from_remote(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => StatusCode::Known(RepairStatus::Queued),
            Some(Value::Number(n)) => match n.as_i64().and_then(RepairStatus::from_numeric) {
                Some(status) => StatusCode::Known(status),
                None => StatusCode::Unknown(n.to_string()),
            },
            Some(Value::String(s)) if s.trim().is_empty() => {
                StatusCode::Known(RepairStatus::Queued)
            }
            Some(Value::String(s)) => match RepairStatus::from_code(s) {
                Some(status) => StatusCode::Known(status),
                None => StatusCode::Unknown(s.clone()),
            },
            Some(other) => StatusCode::Unknown(other.to_string()),
        }
    }

    /// Encodes a local label. Labels that are not ours pass through untouched.
    pub fn from_label(label: &str) -> Self {
        if label.trim().is_empty() {
            return StatusCode::Known(RepairStatus::Queued);
        }
        match RepairStatus::from_label(label).or_else(|| RepairStatus::from_code(label)) {
            Some(status) => StatusCode::Known(status),
            None => StatusCode::Unknown(label.to_string()),
        }
    }

    pub fn label(&self) -> String {
        match self {
            StatusCode::Known(status) => status.label().to_string(),
            StatusCode::Unknown(raw) => raw.clone(),
        }
    }

    pub fn code(&self) -> String {
        match self {
            StatusCode::Known(status) => status.code().to_string(),
            StatusCode::Unknown(raw) => raw.clone(),
        }
    }

    pub fn to_remote(&self) -> Value {
        Value::String(self.code())
    }
}

/// Remote code to local label.
pub fn status_label(code: &str) -> String {
    StatusCode::from_remote(Some(&Value::String(code.to_string()))).label()
}

/// Local label to remote code.
pub fn status_code(label: &str) -> String {
    StatusCode::from_label(label).code()
}
