//! Dispense ledger: remaining-quantity calculation and reconciliation.

mod engine;
mod remaining;
mod request;

pub use engine::{DispenseEngine, Verification};
pub use remaining::{compute_remaining, remaining_from_totals};
pub use request::{DispenseRequest, RequestedItem};
