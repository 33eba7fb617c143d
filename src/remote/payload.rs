//! Lenient conversion between remote JSON records and local models.
//!
//! Remote payloads are not trusted to be complete. Missing fields take a
//! fixed default, values of the wrong JSON type are coerced when the intent
//! is clear, and a record that cannot be read at all becomes a placeholder
//! labelled [`PARSE_ERROR_LABEL`] instead of failing the whole batch.
//! Parsing never consults the clock, so the same input always gives the
//! same record.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};

use crate::models::{Repair, StatusCode, Transaction, TransactionKind, WarehouseItem};

/// Name given to records whose payload could not be read.
pub const PARSE_ERROR_LABEL: &str = "Error parsing";

/// A parsed remote record.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub record: T,
    /// True when the payload was malformed and `record` is a best-effort stand-in.
    pub placeholder: bool,
}

/// Remote id of a payload, accepting numbers and numeric strings.
pub fn remote_id_of(value: &Value) -> Option<i64> {
    value.as_object().and_then(|obj| as_int(obj.get("id")?))
}

/// Field reader that remembers whether any present field had an unusable type.
struct Fields<'a> {
    obj: Option<&'a Map<String, Value>>,
    malformed: bool,
}

impl<'a> Fields<'a> {
    fn new(value: &'a Value) -> Self {
        let obj = value.as_object();
        Self {
            obj,
            malformed: obj.is_none(),
        }
    }

    fn raw(&self, keys: &[&str]) -> Option<&'a Value> {
        let obj = self.obj?;
        keys.iter()
            .filter_map(|key| obj.get(*key))
            .find(|v| !v.is_null())
    }

    fn text(&mut self, keys: &[&str]) -> String {
        match self.raw(keys) {
            None => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(_) => {
                self.malformed = true;
                String::new()
            }
        }
    }

    fn number(&mut self, keys: &[&str]) -> f64 {
        match self.raw(keys) {
            None => 0.0,
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) if s.trim().is_empty() => 0.0,
            Some(Value::String(s)) => match s.trim().replace(',', ".").parse::<f64>() {
                Ok(n) if n.is_finite() => n,
                _ => {
                    self.malformed = true;
                    0.0
                }
            },
            Some(_) => {
                self.malformed = true;
                0.0
            }
        }
    }

    fn integer(&mut self, keys: &[&str]) -> i64 {
        self.optional_integer(keys).unwrap_or(0)
    }

    fn optional_integer(&mut self, keys: &[&str]) -> Option<i64> {
        let value = self.raw(keys)?;
        if matches!(value, Value::String(s) if s.trim().is_empty()) {
            return None;
        }
        let parsed = as_int(value);
        if parsed.is_none() {
            self.malformed = true;
        }
        parsed
    }

    fn flag(&mut self, keys: &[&str]) -> bool {
        match self.raw(keys) {
            None => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
            Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" | "" => false,
                _ => {
                    self.malformed = true;
                    false
                }
            },
            Some(_) => {
                self.malformed = true;
                false
            }
        }
    }

    /// Missing timestamps read as the Unix epoch.
    fn timestamp(&mut self, keys: &[&str]) -> DateTime<Utc> {
        match self.raw(keys) {
            None => DateTime::<Utc>::default(),
            Some(value) => match parse_remote_time(value) {
                Some(ts) => ts,
                None => {
                    self.malformed = true;
                    DateTime::<Utc>::default()
                }
            },
        }
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD` and epoch milliseconds.
fn parse_remote_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt.and_utc());
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                return Some(dt.and_utc());
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        }
        _ => None,
    }
}

pub fn parse_repair(value: &Value) -> Parsed<Repair> {
    let mut fields = Fields::new(value);
    let created_at = fields.timestamp(&["created_at", "date"]);
    let last_modified = match fields.raw(&["updated_at", "last_modified"]) {
        Some(_) => fields.timestamp(&["updated_at", "last_modified"]),
        None => created_at,
    };

    let mut record = Repair {
        id: 0,
        remote_id: remote_id_of(value),
        receipt_number: fields.integer(&["receipt_number", "receipt"]),
        client_name: fields.text(&["client_name", "client"]),
        client_phone: fields.text(&["client_phone", "phone"]),
        device: fields.text(&["device"]),
        problem: fields.text(&["problem"]),
        status: StatusCode::from_remote(fields.raw(&["status"])).label(),
        executor: fields.text(&["executor"]),
        cost: fields.number(&["cost"]),
        prepayment: fields.number(&["prepayment"]),
        urgent: fields.flag(&["urgent"]),
        created_at,
        last_modified,
        synced: true,
    };

    if fields.malformed {
        record.client_name = PARSE_ERROR_LABEL.to_string();
    }
    Parsed {
        record,
        placeholder: fields.malformed,
    }
}

pub fn parse_warehouse_item(value: &Value) -> Parsed<WarehouseItem> {
    let mut fields = Fields::new(value);
    let mut record = WarehouseItem {
        id: 0,
        remote_id: remote_id_of(value),
        name: fields.text(&["name"]),
        sku: fields.text(&["sku", "barcode"]),
        category: fields.text(&["category"]),
        quantity: fields.integer(&["quantity"]),
        price: fields.number(&["price"]),
        location: fields.text(&["location"]),
        last_modified: fields.timestamp(&["updated_at", "last_modified"]),
        synced: true,
    };

    if fields.malformed {
        record.name = PARSE_ERROR_LABEL.to_string();
    }
    Parsed {
        record,
        placeholder: fields.malformed,
    }
}

pub fn parse_transaction(value: &Value) -> Parsed<Transaction> {
    let mut fields = Fields::new(value);
    let raw_amount = fields.number(&["amount"]);
    let kind = match fields.text(&["kind", "type"]) {
        k if k.is_empty() => None,
        k => match k.parse::<TransactionKind>() {
            Ok(kind) => Some(kind),
            Err(_) => {
                fields.malformed = true;
                None
            }
        },
    };
    let kind = kind.unwrap_or(if raw_amount < 0.0 {
        TransactionKind::Expense
    } else {
        TransactionKind::Income
    });
    let occurred_at = fields.timestamp(&["occurred_at", "date"]);
    let last_modified = match fields.raw(&["updated_at", "last_modified"]) {
        Some(_) => fields.timestamp(&["updated_at", "last_modified"]),
        None => occurred_at,
    };

    let mut record = Transaction {
        id: 0,
        remote_id: remote_id_of(value),
        kind,
        amount: raw_amount.abs(),
        description: fields.text(&["description"]),
        category: fields.text(&["category"]),
        repair_receipt: fields.optional_integer(&["repair_receipt", "receipt_number"]),
        occurred_at,
        last_modified,
        synced: true,
    };

    if fields.malformed {
        record.description = PARSE_ERROR_LABEL.to_string();
    }
    Parsed {
        record,
        placeholder: fields.malformed,
    }
}

/// Body sent on create/update. Local ids never leave the device.
pub fn repair_payload(repair: &Repair) -> Value {
    json!({
        "receipt_number": repair.receipt_number,
        "client_name": repair.client_name,
        "client_phone": repair.client_phone,
        "device": repair.device,
        "problem": repair.problem,
        "status": StatusCode::from_label(&repair.status).to_remote(),
        "executor": repair.executor,
        "cost": repair.cost,
        "prepayment": repair.prepayment,
        "urgent": repair.urgent,
        "created_at": repair.created_at.to_rfc3339(),
        "updated_at": repair.last_modified.to_rfc3339(),
    })
}
