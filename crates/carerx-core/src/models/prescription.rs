//! Prescription models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Prescription lifecycle status.
///
/// Dispensing only ever moves a prescription forward:
///
/// ```text
/// Active ─────────────────────────────► Dispensed
///   │   └──► PartiallyDispensed ⟲ ──────────▲
///   │               │
///   ▼               ▼
/// Cancelled ◄───────┘
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrescriptionStatus {
    /// Nothing dispensed yet
    Active,
    /// Some quantity dispensed, some remaining
    PartiallyDispensed,
    /// Every item fully dispensed
    Dispensed,
    /// Withdrawn by the prescriber
    Cancelled,
}

impl PrescriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrescriptionStatus::Active => "ACTIVE",
            PrescriptionStatus::PartiallyDispensed => "PARTIALLY_DISPENSED",
            PrescriptionStatus::Dispensed => "DISPENSED",
            PrescriptionStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(PrescriptionStatus::Active),
            "PARTIALLY_DISPENSED" => Some(PrescriptionStatus::PartiallyDispensed),
            "DISPENSED" => Some(PrescriptionStatus::Dispensed),
            "CANCELLED" => Some(PrescriptionStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether a new dispense event may be recorded against this status.
    pub fn accepts_dispense(&self) -> bool {
        matches!(
            self,
            PrescriptionStatus::Active | PrescriptionStatus::PartiallyDispensed
        )
    }

    /// Whether the prescription can be cancelled from this status.
    pub fn accepts_cancel(&self) -> bool {
        self.accepts_dispense()
    }

    /// Forward-only transition table.
    pub fn can_transition_to(&self, next: PrescriptionStatus) -> bool {
        use PrescriptionStatus::*;
        matches!(
            (self, next),
            (Active, PartiallyDispensed)
                | (Active, Dispensed)
                | (Active, Cancelled)
                | (PartiallyDispensed, PartiallyDispensed)
                | (PartiallyDispensed, Dispensed)
                | (PartiallyDispensed, Cancelled)
        )
    }
}

/// A single prescribed line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionItem {
    pub id: String,
    pub prescription_id: String,
    pub medicine_id: String,
    /// e.g. "1 tablet"
    pub dose: String,
    /// e.g. "2x daily"
    pub frequency: String,
    pub duration_days: u32,
    /// Prescribed quantity, fixed at creation, always > 0
    pub quantity: u32,
}

/// A prescription with its items in creation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub id: String,
    /// User ID of the patient
    pub patient_id: String,
    /// User ID of the prescribing doctor
    pub doctor_id: String,
    pub status: PrescriptionStatus,
    pub notes: Option<String>,
    pub items: Vec<PrescriptionItem>,
    pub created_at: DateTime<Utc>,
}

impl Prescription {
    /// Find an item of this prescription by ID.
    pub fn item(&self, item_id: &str) -> Option<&PrescriptionItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn contains_item(&self, item_id: &str) -> bool {
        self.item(item_id).is_some()
    }
}

/// Input for a new prescription line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPrescriptionItem {
    pub medicine_id: String,
    pub dose: String,
    pub frequency: String,
    pub duration_days: u32,
    pub quantity: u32,
}

/// Input for a new prescription, validated before it reaches the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPrescription {
    pub patient_id: String,
    pub doctor_id: String,
    pub notes: Option<String>,
    pub items: Vec<NewPrescriptionItem>,
}

impl NewPrescription {
    /// Validate the input and build an ACTIVE prescription with fresh IDs.
    pub fn into_prescription(self) -> CoreResult<Prescription> {
        if self.patient_id.trim().is_empty() || self.doctor_id.trim().is_empty() {
            return Err(CoreError::InvalidInput(
                "patient and doctor are required".into(),
            ));
        }
        if self.items.is_empty() {
            return Err(CoreError::InvalidInput(
                "a prescription needs at least one item".into(),
            ));
        }

        let prescription_id = uuid::Uuid::new_v4().to_string();
        let mut items = Vec::with_capacity(self.items.len());
        for (index, item) in self.items.into_iter().enumerate() {
            if item.medicine_id.trim().is_empty()
                || item.dose.trim().is_empty()
                || item.frequency.trim().is_empty()
            {
                return Err(CoreError::InvalidInput(format!(
                    "item {} is missing medicine, dose or frequency",
                    index
                )));
            }
            if item.quantity == 0 || item.duration_days == 0 {
                return Err(CoreError::InvalidInput(format!(
                    "item {} must have a positive quantity and duration",
                    index
                )));
            }
            items.push(PrescriptionItem {
                id: uuid::Uuid::new_v4().to_string(),
                prescription_id: prescription_id.clone(),
                medicine_id: item.medicine_id,
                dose: item.dose,
                frequency: item.frequency,
                duration_days: item.duration_days,
                quantity: item.quantity,
            });
        }

        let notes = self
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(Prescription {
            id: prescription_id,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            status: PrescriptionStatus::Active,
            notes,
            items,
            created_at: Utc::now(),
        })
    }
}
