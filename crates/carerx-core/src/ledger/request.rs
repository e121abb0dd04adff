//! Dispense request input.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// One requested line: how much of a prescription item to hand out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestedItem {
    pub prescription_item_id: String,
    pub quantity: u32,
}

impl RequestedItem {
    pub fn new(prescription_item_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            prescription_item_id: prescription_item_id.into(),
            quantity,
        }
    }
}

/// A pharmacist's dispense request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispenseRequest {
    pub items: Vec<RequestedItem>,
    pub notes: Option<String>,
    /// Pharmacy to dispense on behalf of, when the pharmacist belongs to several
    pub pharmacy_org_id: Option<String>,
}

impl DispenseRequest {
    pub fn new(items: Vec<RequestedItem>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn at_pharmacy(mut self, org_id: impl Into<String>) -> Self {
        self.pharmacy_org_id = Some(org_id.into());
        self
    }

    /// Shape checks that need no database access.
    pub fn validate(&self) -> CoreResult<()> {
        if self.items.is_empty() {
            return Err(CoreError::InvalidInput(
                "at least one item must be dispensed".into(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.items.len());
        for item in &self.items {
            if item.prescription_item_id.trim().is_empty() {
                return Err(CoreError::InvalidInput(
                    "prescription item id is required".into(),
                ));
            }
            if item.quantity == 0 {
                return Err(CoreError::InvalidInput(format!(
                    "quantity for item {} must be positive",
                    item.prescription_item_id
                )));
            }
            if !seen.insert(item.prescription_item_id.as_str()) {
                return Err(CoreError::InvalidInput(format!(
                    "item {} is listed more than once",
                    item.prescription_item_id
                )));
            }
        }

        if self.notes.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(CoreError::InvalidInput("notes must not be blank".into()));
        }

        Ok(())
    }

    /// Requested quantity for an item, 0 if not requested.
    pub fn quantity_for(&self, prescription_item_id: &str) -> u32 {
        self.items
            .iter()
            .find(|item| item.prescription_item_id == prescription_item_id)
            .map_or(0, |item| item.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_request() {
        let request = DispenseRequest::new(vec![
            RequestedItem::new("a", 6),
            RequestedItem::new("b", 1),
        ])
        .with_notes("first fill");
        assert!(request.validate().is_ok());
        assert_eq!(request.quantity_for("a"), 6);
        assert_eq!(request.quantity_for("c"), 0);
    }

    #[test]
    fn test_rejects_empty_and_zero() {
        assert!(DispenseRequest::new(vec![]).validate().is_err());
        let err = DispenseRequest::new(vec![RequestedItem::new("a", 0)])
            .validate()
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[test]
    fn test_rejects_duplicates() {
        let request = DispenseRequest::new(vec![
            RequestedItem::new("a", 2),
            RequestedItem::new("a", 3),
        ]);
        assert!(matches!(request.validate(), Err(CoreError::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_blank_notes_and_ids() {
        let request = DispenseRequest::new(vec![RequestedItem::new("a", 1)]).with_notes("   ");
        assert!(request.validate().is_err());
        assert!(DispenseRequest::new(vec![RequestedItem::new(" ", 1)])
            .validate()
            .is_err());
    }
}
