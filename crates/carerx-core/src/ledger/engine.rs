//! Dispense reconciliation.
//!
//! Every dispense re-derives the remaining quantities from the complete
//! ledger inside one IMMEDIATE transaction. A concurrent writer on another
//! connection waits for the lock and then sees this write, so two requests
//! can never both spend the same remaining quantity.

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::remaining::remaining_from_totals;
use super::request::DispenseRequest;
use crate::access::{AccessEvaluator, ClinicalGrant};
use crate::audit::{self, AuditEvent, AuditSink};
use crate::config::LedgerConfig;
use crate::db::{Database, Store};
use crate::error::{CoreError, CoreResult};
use crate::models::{
    Actor, DispenseItem, DispenseRecord, DispenseStatus, Prescription, PrescriptionStatus,
    RemainingItem,
};

/// Advisory snapshot returned by [`DispenseEngine::verify`].
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub prescription: Prescription,
    /// One entry per prescription item, in item order
    pub remaining: Vec<RemainingItem>,
}

impl Verification {
    /// Nothing left to hand out.
    pub fn is_fully_dispensed(&self) -> bool {
        self.remaining.iter().all(RemainingItem::is_exhausted)
    }
}

/// Verifies and records dispenses against a prescription.
pub struct DispenseEngine<'a> {
    db: &'a mut Database,
    audit: &'a dyn AuditSink,
    config: &'a LedgerConfig,
}

impl<'a> DispenseEngine<'a> {
    pub fn new(db: &'a mut Database, audit: &'a dyn AuditSink, config: &'a LedgerConfig) -> Self {
        Self { db, audit, config }
    }

    /// Current remaining quantities of a prescription. Never writes.
    pub fn verify(&mut self, prescription_id: &str, actor: &Actor) -> CoreResult<Verification> {
        // Deferred and never committed: one consistent read snapshot
        let tx = self.db.transaction()?;
        let store = Store::new(&tx);

        let prescription = load_prescription(store, prescription_id)?;
        if prescription.status == PrescriptionStatus::Cancelled {
            return Err(CoreError::InvalidState(format!(
                "prescription {} is cancelled",
                prescription.id
            )));
        }

        if !AccessEvaluator::new(&store).can_verify(actor)? {
            return Err(CoreError::Forbidden(
                "only pharmacists and administrators can verify prescriptions".into(),
            ));
        }

        let totals = store.dispensed_totals(&prescription.id)?;
        let remaining = remaining_from_totals(&prescription.items, &totals);
        for item in remaining.iter().filter(|item| item.excess_quantity > 0) {
            warn!(
                prescription = %prescription.id,
                item = %item.prescription_item_id,
                prescribed = item.prescribed_quantity,
                dispensed = item.dispensed_quantity,
                "Ledger holds more than was prescribed"
            );
        }
        debug!(prescription = %prescription.id, ?remaining, "Verified prescription");

        Ok(Verification {
            prescription,
            remaining,
        })
    }

    /// Record a dispense and advance the prescription status.
    pub fn dispense(
        &mut self,
        prescription_id: &str,
        actor: &Actor,
        request: &DispenseRequest,
    ) -> CoreResult<DispenseRecord> {
        request.validate()?;

        let tx = self.db.write_transaction()?;
        let store = Store::new(&tx);

        let prescription = load_prescription(store, prescription_id)?;
        if prescription.status == PrescriptionStatus::Cancelled {
            return Err(CoreError::InvalidState(format!(
                "prescription {} is cancelled",
                prescription.id
            )));
        }

        let pharmacy_org_id = AccessEvaluator::new(&store)
            .can_dispense(actor, request.pharmacy_org_id.as_deref())?
            .ok_or_else(|| {
                CoreError::Forbidden("only pharmacists at a pharmacy can dispense".into())
            })?;

        let unknown: Vec<&str> = request
            .items
            .iter()
            .filter(|item| !prescription.contains_item(&item.prescription_item_id))
            .map(|item| item.prescription_item_id.as_str())
            .collect();
        if !unknown.is_empty() {
            return Err(CoreError::InvalidInput(format!(
                "items not on prescription {}: {}",
                prescription.id,
                unknown.join(", ")
            )));
        }

        let totals = store.dispensed_totals(&prescription.id)?;
        let remaining = remaining_from_totals(&prescription.items, &totals);
        check_integrity(self.config, &prescription, &remaining)?;

        for requested in &request.items {
            let available = remaining
                .iter()
                .find(|item| item.prescription_item_id == requested.prescription_item_id)
                .map_or(0, |item| item.remaining_quantity);
            if requested.quantity > available {
                return Err(CoreError::OverDispense {
                    prescription_item_id: requested.prescription_item_id.clone(),
                    requested: requested.quantity,
                    remaining: available,
                });
            }
        }

        // A DISPENSED prescription has nothing left, so the loop above has
        // already refused it unless the ledger disagrees with the status
        if !prescription.status.accepts_dispense() {
            return Err(CoreError::InvalidState(format!(
                "prescription {} is {} and cannot be dispensed",
                prescription.id,
                prescription.status.as_str()
            )));
        }

        let is_fully_dispensed = remaining
            .iter()
            .all(|item| item.remaining_quantity == request.quantity_for(&item.prescription_item_id));

        let record_id = uuid::Uuid::new_v4().to_string();
        let record = DispenseRecord {
            id: record_id.clone(),
            prescription_id: prescription.id.clone(),
            dispensed_by_id: actor.user_id.clone(),
            pharmacy_org_id,
            status: if is_fully_dispensed {
                DispenseStatus::Full
            } else {
                DispenseStatus::Partial
            },
            notes: request.notes.as_ref().map(|n| n.trim().to_string()),
            items: request
                .items
                .iter()
                .map(|item| DispenseItem {
                    id: uuid::Uuid::new_v4().to_string(),
                    dispense_record_id: record_id.clone(),
                    prescription_item_id: item.prescription_item_id.clone(),
                    quantity: item.quantity,
                })
                .collect(),
            created_at: Utc::now(),
        };
        store.insert_dispense_record(&record)?;

        let next_status = if is_fully_dispensed {
            PrescriptionStatus::Dispensed
        } else {
            PrescriptionStatus::PartiallyDispensed
        };
        if !store.update_prescription_status(&prescription.id, prescription.status, next_status)? {
            return Err(CoreError::Conflict {
                message: format!("prescription {} changed during dispense", prescription.id),
                retryable: true,
            });
        }

        tx.commit()?;

        info!(
            prescription = %record.prescription_id,
            record = %record.id,
            pharmacy = %record.pharmacy_org_id,
            status = record.status.as_str(),
            prescription_status = next_status.as_str(),
            "Dispense recorded"
        );

        audit::emit(
            self.audit,
            AuditEvent::new("prescription.dispense", "dispense_record", Some(record.id.clone()))
                .actor(&actor.user_id)
                .org(&record.pharmacy_org_id)
                .metadata(json!({
                    "prescriptionId": record.prescription_id,
                    "status": record.status.as_str(),
                    "items": record.items.iter().map(|item| json!({
                        "prescriptionItemId": item.prescription_item_id,
                        "quantity": item.quantity,
                    })).collect::<Vec<_>>(),
                })),
        );

        Ok(record)
    }

    /// Dispense records of a prescription, newest first.
    ///
    /// Readable by the patient, their guardians, the prescribing doctor,
    /// pharmacists and administrators.
    pub fn history(&mut self, prescription_id: &str, actor: &Actor) -> CoreResult<Vec<DispenseRecord>> {
        let tx = self.db.transaction()?;
        let store = Store::new(&tx);

        let prescription = load_prescription(store, prescription_id)?;
        let allowed = actor.user_id == prescription.doctor_id
            || AccessEvaluator::new(&store).can_read_patient_record(
                actor,
                &prescription.patient_id,
                ClinicalGrant::Dispenses,
            )?;
        if !allowed {
            return Err(CoreError::Forbidden(
                "not allowed to view this dispense history".into(),
            ));
        }

        Ok(store.list_dispense_records(&prescription.id)?)
    }
}

/// Refuse to build on a ledger that already exceeds a prescribed quantity.
fn check_integrity(
    config: &LedgerConfig,
    prescription: &Prescription,
    remaining: &[RemainingItem],
) -> CoreResult<()> {
    let Some(item) = remaining.iter().find(|item| item.excess_quantity > 0) else {
        return Ok(());
    };

    if config.strict_integrity {
        error!(
            prescription = %prescription.id,
            item = %item.prescription_item_id,
            prescribed = item.prescribed_quantity,
            dispensed = item.dispensed_quantity,
            "Ledger integrity violation"
        );
        return Err(CoreError::DataIntegrity(format!(
            "item {} dispensed {} of {} prescribed",
            item.prescription_item_id, item.dispensed_quantity, item.prescribed_quantity
        )));
    }

    warn!(
        prescription = %prescription.id,
        item = %item.prescription_item_id,
        excess = item.excess_quantity,
        "Ledger holds more than was prescribed"
    );
    Ok(())
}

fn load_prescription(store: Store<'_>, prescription_id: &str) -> CoreResult<Prescription> {
    store
        .get_prescription(prescription_id)?
        .ok_or_else(|| CoreError::not_found("Prescription", prescription_id))
}
