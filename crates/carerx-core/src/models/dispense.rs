//! Dispense ledger models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a dispense event completed the prescription.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispenseStatus {
    Partial,
    Full,
}

impl DispenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispenseStatus::Partial => "PARTIAL",
            DispenseStatus::Full => "FULL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PARTIAL" => Some(DispenseStatus::Partial),
            "FULL" => Some(DispenseStatus::Full),
            _ => None,
        }
    }
}

/// One dispensed line of a dispense event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispenseItem {
    pub id: String,
    pub dispense_record_id: String,
    pub prescription_item_id: String,
    /// Amount handed out in this event, always > 0
    pub quantity: u32,
}

/// An append-only dispense event. Never updated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispenseRecord {
    pub id: String,
    pub prescription_id: String,
    /// User ID of the pharmacist
    pub dispensed_by_id: String,
    /// Pharmacy the pharmacist acted for
    pub pharmacy_org_id: String,
    pub status: DispenseStatus,
    pub notes: Option<String>,
    pub items: Vec<DispenseItem>,
    pub created_at: DateTime<Utc>,
}

/// Derived per-item ledger position. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemainingItem {
    pub prescription_item_id: String,
    pub prescribed_quantity: u32,
    /// Sum of every dispensed quantity for this item across all records
    pub dispensed_quantity: u64,
    /// `max(prescribed - dispensed, 0)`
    pub remaining_quantity: u32,
    /// `max(dispensed - prescribed, 0)`; non-zero only for a corrupted ledger
    pub excess_quantity: u64,
}

impl RemainingItem {
    pub fn is_exhausted(&self) -> bool {
        self.remaining_quantity == 0
    }
}
