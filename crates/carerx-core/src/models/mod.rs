//! Domain models for the dispensing ledger.

mod directory;
mod dispense;
mod invite;
mod prescription;

pub use directory::*;
pub use dispense::*;
pub use invite::*;
pub use prescription::*;
