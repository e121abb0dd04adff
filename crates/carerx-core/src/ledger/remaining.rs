//! Remaining-quantity calculation.
//!
//! Pure functions over a prescription's items and its dispense ledger. The
//! result never depends on the order of the ledger entries.

use std::collections::HashMap;

use crate::models::{DispenseItem, PrescriptionItem, RemainingItem};

/// Per-item position derived from the full dispense history.
///
/// History entries for items not on the prescription are ignored. The
/// result follows `items` order.
pub fn compute_remaining(items: &[PrescriptionItem], history: &[DispenseItem]) -> Vec<RemainingItem> {
    let mut totals: HashMap<&str, u64> = HashMap::with_capacity(items.len());
    for entry in history {
        *totals.entry(entry.prescription_item_id.as_str()).or_default() += u64::from(entry.quantity);
    }

    items
        .iter()
        .map(|item| remaining_item(item, totals.get(item.id.as_str()).copied().unwrap_or(0)))
        .collect()
}

/// Same as [`compute_remaining`], over totals already summed per item
/// (e.g. by `Store::dispensed_totals`).
pub fn remaining_from_totals(
    items: &[PrescriptionItem],
    totals: &HashMap<String, u64>,
) -> Vec<RemainingItem> {
    items
        .iter()
        .map(|item| remaining_item(item, totals.get(&item.id).copied().unwrap_or(0)))
        .collect()
}

fn remaining_item(item: &PrescriptionItem, dispensed: u64) -> RemainingItem {
    let prescribed = u64::from(item.quantity);
    // Clamp at zero; excess is reported separately
    let remaining = prescribed.saturating_sub(dispensed);

    RemainingItem {
        prescription_item_id: item.id.clone(),
        prescribed_quantity: item.quantity,
        dispensed_quantity: dispensed,
        remaining_quantity: remaining as u32,
        excess_quantity: dispensed.saturating_sub(prescribed),
    }
}
