//! Dispense ledger behaviour through the public engine API.

mod common;

use carerx_core::audit::{AuditError, AuditEvent, AuditSink, MemoryAuditSink};
use carerx_core::config::LedgerConfig;
use carerx_core::db::Database;
use carerx_core::ledger::{DispenseEngine, DispenseRequest, RequestedItem};
use carerx_core::models::{
    DispenseItem, DispenseRecord, DispenseStatus, Prescription, PrescriptionStatus,
};
use carerx_core::CoreError;
use common::{pharmacist, prescribe, request, root_admin, seed_pharmacy};
use proptest::prelude::*;

fn status_of(db: &Database, prescription_id: &str) -> PrescriptionStatus {
    db.store()
        .get_prescription(prescription_id)
        .unwrap()
        .unwrap()
        .status
}

// =============================================================================
// Sequences
// =============================================================================

#[test]
fn test_partial_full_then_over_dispense() {
    let mut db = Database::open_in_memory().unwrap();
    let org = seed_pharmacy(&db);
    let rx = prescribe(&mut db, &[10]);
    let actor = pharmacist(&org);
    let audit = MemoryAuditSink::new();
    let config = LedgerConfig::default();

    let mut engine = DispenseEngine::new(&mut db, &audit, &config);

    let first = engine.dispense(&rx.id, &actor, &request(&rx, &[(0, 6)])).unwrap();
    assert_eq!(first.status, DispenseStatus::Partial);
    let verification = engine.verify(&rx.id, &actor).unwrap();
    assert_eq!(verification.remaining[0].remaining_quantity, 4);
    assert_eq!(verification.prescription.status, PrescriptionStatus::PartiallyDispensed);

    let second = engine.dispense(&rx.id, &actor, &request(&rx, &[(0, 4)])).unwrap();
    assert_eq!(second.status, DispenseStatus::Full);
    let verification = engine.verify(&rx.id, &actor).unwrap();
    assert!(verification.is_fully_dispensed());
    assert_eq!(verification.prescription.status, PrescriptionStatus::Dispensed);

    let err = engine
        .dispense(&rx.id, &actor, &request(&rx, &[(0, 1)]))
        .unwrap_err();
    match err {
        CoreError::OverDispense {
            prescription_item_id,
            requested,
            remaining,
        } => {
            assert_eq!(prescription_item_id, rx.items[0].id);
            assert_eq!(requested, 1);
            assert_eq!(remaining, 0);
        }
        other => panic!("expected OverDispense, got {:?}", other),
    }

    drop(engine);
    assert_eq!(status_of(&db, &rx.id), PrescriptionStatus::Dispensed);
    assert_eq!(db.store().count_dispense_records(&rx.id).unwrap(), 2);
    assert_eq!(audit.events().len(), 2);
}

#[test]
fn test_all_items_in_one_call_is_full() {
    let mut db = Database::open_in_memory().unwrap();
    let org = seed_pharmacy(&db);
    let rx = prescribe(&mut db, &[5, 5]);
    let audit = MemoryAuditSink::new();
    let config = LedgerConfig::default();

    let record = DispenseEngine::new(&mut db, &audit, &config)
        .dispense(&rx.id, &pharmacist(&org), &request(&rx, &[(0, 5), (1, 5)]))
        .unwrap();

    assert_eq!(record.status, DispenseStatus::Full);
    assert_eq!(record.items.len(), 2);
    assert_eq!(record.pharmacy_org_id, org);
    assert_eq!(status_of(&db, &rx.id), PrescriptionStatus::Dispensed);
    assert_eq!(db.store().count_dispense_records(&rx.id).unwrap(), 1);
}

#[test]
fn test_one_item_finished_other_untouched_is_partial() {
    let mut db = Database::open_in_memory().unwrap();
    let org = seed_pharmacy(&db);
    let rx = prescribe(&mut db, &[5, 5]);
    let audit = MemoryAuditSink::new();
    let config = LedgerConfig::default();

    let record = DispenseEngine::new(&mut db, &audit, &config)
        .dispense(&rx.id, &pharmacist(&org), &request(&rx, &[(0, 5)]))
        .unwrap();

    assert_eq!(record.status, DispenseStatus::Partial);
    assert_eq!(status_of(&db, &rx.id), PrescriptionStatus::PartiallyDispensed);
}

#[test]
fn test_cancelled_prescription_rejects_dispense() {
    let mut db = Database::open_in_memory().unwrap();
    let org = seed_pharmacy(&db);
    let rx = prescribe(&mut db, &[10]);
    assert!(db.store().cancel_prescription(&rx.id).unwrap());
    let audit = MemoryAuditSink::new();
    let config = LedgerConfig::default();

    let err = DispenseEngine::new(&mut db, &audit, &config)
        .dispense(&rx.id, &pharmacist(&org), &request(&rx, &[(0, 1)]))
        .unwrap_err();

    assert_eq!(err.code(), "INVALID_STATE");
    assert_eq!(db.store().count_dispense_records(&rx.id).unwrap(), 0);
    assert!(audit.events().is_empty());
}

#[test]
fn test_dispensed_status_with_stock_left_is_invalid_state() {
    let mut db = Database::open_in_memory().unwrap();
    let org = seed_pharmacy(&db);
    let rx = prescribe(&mut db, &[10]);
    // Status says done while the ledger is still empty
    assert!(db
        .store()
        .update_prescription_status(
            &rx.id,
            PrescriptionStatus::Active,
            PrescriptionStatus::Dispensed
        )
        .unwrap());
    let audit = MemoryAuditSink::new();
    let config = LedgerConfig::default();

    let err = DispenseEngine::new(&mut db, &audit, &config)
        .dispense(&rx.id, &pharmacist(&org), &request(&rx, &[(0, 1)]))
        .unwrap_err();

    assert_eq!(err.code(), "INVALID_STATE");
    assert_eq!(db.store().count_dispense_records(&rx.id).unwrap(), 0);
    assert_eq!(status_of(&db, &rx.id), PrescriptionStatus::Dispensed);
    assert!(audit.events().is_empty());
}

#[test]
fn test_unknown_item_rejected_without_write() {
    let mut db = Database::open_in_memory().unwrap();
    let org = seed_pharmacy(&db);
    let rx = prescribe(&mut db, &[10]);
    let other = prescribe(&mut db, &[10]);
    let audit = MemoryAuditSink::new();
    let config = LedgerConfig::default();

    let stray = DispenseRequest::new(vec![
        RequestedItem::new(rx.items[0].id.clone(), 1),
        RequestedItem::new(other.items[0].id.clone(), 1),
    ]);
    let err = DispenseEngine::new(&mut db, &audit, &config)
        .dispense(&rx.id, &pharmacist(&org), &stray)
        .unwrap_err();

    assert_eq!(err.code(), "INVALID_INPUT");
    assert_eq!(db.store().count_dispense_records(&rx.id).unwrap(), 0);
    assert_eq!(status_of(&db, &rx.id), PrescriptionStatus::Active);
}

#[test]
fn test_root_admin_can_verify_but_not_dispense() {
    let mut db = Database::open_in_memory().unwrap();
    seed_pharmacy(&db);
    let rx = prescribe(&mut db, &[10]);
    let audit = MemoryAuditSink::new();
    let config = LedgerConfig::default();
    let mut engine = DispenseEngine::new(&mut db, &audit, &config);

    assert!(engine.verify(&rx.id, &root_admin()).is_ok());
    let err = engine
        .dispense(&rx.id, &root_admin(), &request(&rx, &[(0, 1)]))
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");
}

#[test]
fn test_notes_are_trimmed_and_kept() {
    let mut db = Database::open_in_memory().unwrap();
    let org = seed_pharmacy(&db);
    let rx = prescribe(&mut db, &[10]);
    let audit = MemoryAuditSink::new();
    let config = LedgerConfig::default();

    let mut engine = DispenseEngine::new(&mut db, &audit, &config);
    engine
        .dispense(
            &rx.id,
            &pharmacist(&org),
            &request(&rx, &[(0, 2)]).with_notes("  brand substituted  "),
        )
        .unwrap();

    let history = engine.history(&rx.id, &pharmacist(&org)).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].notes.as_deref(), Some("brand substituted"));
}

// =============================================================================
// Verify
// =============================================================================

#[test]
fn test_verify_is_read_only() {
    let mut db = Database::open_in_memory().unwrap();
    let org = seed_pharmacy(&db);
    let rx = prescribe(&mut db, &[10, 3]);
    let audit = MemoryAuditSink::new();
    let config = LedgerConfig::default();
    let actor = pharmacist(&org);

    let mut engine = DispenseEngine::new(&mut db, &audit, &config);
    engine.dispense(&rx.id, &actor, &request(&rx, &[(1, 2)])).unwrap();

    let first = engine.verify(&rx.id, &actor).unwrap();
    let second = engine.verify(&rx.id, &actor).unwrap();
    assert_eq!(first.remaining, second.remaining);
    assert_eq!(first.prescription, second.prescription);
    assert_eq!(first.remaining[1].remaining_quantity, 1);

    drop(engine);
    assert_eq!(db.store().count_dispense_records(&rx.id).unwrap(), 1);
    assert_eq!(audit.events().len(), 1);
}

#[test]
fn test_stale_verify_cannot_authorize_over_dispense() {
    let mut db = Database::open_in_memory().unwrap();
    let org = seed_pharmacy(&db);
    let rx = prescribe(&mut db, &[10]);
    let audit = MemoryAuditSink::new();
    let config = LedgerConfig::default();
    let actor = pharmacist(&org);

    let mut engine = DispenseEngine::new(&mut db, &audit, &config);
    let snapshot = engine.verify(&rx.id, &actor).unwrap();
    assert_eq!(snapshot.remaining[0].remaining_quantity, 10);

    engine.dispense(&rx.id, &actor, &request(&rx, &[(0, 7)])).unwrap();

    // Acting on the old snapshot: 10 looked available, only 3 are
    let err = engine
        .dispense(&rx.id, &actor, &request(&rx, &[(0, 5)]))
        .unwrap_err();
    assert_eq!(err.code(), "OVER_DISPENSE");
}

// =============================================================================
// Audit and integrity
// =============================================================================

struct BrokenSink;

impl AuditSink for BrokenSink {
    fn record(&self, _event: &AuditEvent) -> Result<(), AuditError> {
        Err(AuditError::Unavailable("audit store offline".into()))
    }
}

#[test]
fn test_audit_failure_does_not_roll_back_dispense() {
    let mut db = Database::open_in_memory().unwrap();
    let org = seed_pharmacy(&db);
    let rx = prescribe(&mut db, &[10]);
    let config = LedgerConfig::default();

    let record = DispenseEngine::new(&mut db, &BrokenSink, &config)
        .dispense(&rx.id, &pharmacist(&org), &request(&rx, &[(0, 3)]))
        .unwrap();

    let history = db.store().list_dispense_records(&rx.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, record.id);
    assert_eq!(status_of(&db, &rx.id), PrescriptionStatus::PartiallyDispensed);
}

/// Write a ledger row past the prescribed quantity, bypassing the engine.
fn corrupt_ledger(db: &mut Database, org: &str, quantities: &[u32], excess: u32) -> Prescription {
    let rx = prescribe(db, quantities);
    db.conn()
        .execute_batch("DROP TRIGGER dispense_items_within_prescribed")
        .unwrap();

    let record_id = uuid::Uuid::new_v4().to_string();
    let record = DispenseRecord {
        id: record_id.clone(),
        prescription_id: rx.id.clone(),
        dispensed_by_id: "legacy-import".into(),
        pharmacy_org_id: org.into(),
        status: DispenseStatus::Partial,
        notes: None,
        items: vec![DispenseItem {
            id: uuid::Uuid::new_v4().to_string(),
            dispense_record_id: record_id,
            prescription_item_id: rx.items[0].id.clone(),
            quantity: quantities[0] + excess,
        }],
        created_at: chrono::Utc::now(),
    };
    db.store().insert_dispense_record(&record).unwrap();
    rx
}

#[test]
fn test_strict_integrity_refuses_corrupted_ledger() {
    let mut db = Database::open_in_memory().unwrap();
    let org = seed_pharmacy(&db);
    let rx = corrupt_ledger(&mut db, &org, &[10, 5], 2);
    let audit = MemoryAuditSink::new();
    let config = LedgerConfig::default();
    assert!(config.strict_integrity);

    let mut engine = DispenseEngine::new(&mut db, &audit, &config);

    // Reads still report the excess
    let verification = engine.verify(&rx.id, &pharmacist(&org)).unwrap();
    assert_eq!(verification.remaining[0].remaining_quantity, 0);
    assert_eq!(verification.remaining[0].excess_quantity, 2);

    let err = engine
        .dispense(&rx.id, &pharmacist(&org), &request(&rx, &[(1, 2)]))
        .unwrap_err();
    assert_eq!(err.code(), "DATA_INTEGRITY");

    drop(engine);
    assert_eq!(db.store().count_dispense_records(&rx.id).unwrap(), 1);
}

#[test]
fn test_lenient_integrity_dispenses_around_corruption() {
    let mut db = Database::open_in_memory().unwrap();
    let org = seed_pharmacy(&db);
    let rx = corrupt_ledger(&mut db, &org, &[10, 5], 2);
    let audit = MemoryAuditSink::new();
    let config = LedgerConfig {
        strict_integrity: false,
        ..LedgerConfig::default()
    };

    let record = DispenseEngine::new(&mut db, &audit, &config)
        .dispense(&rx.id, &pharmacist(&org), &request(&rx, &[(1, 2)]))
        .unwrap();

    assert_eq!(record.status, DispenseStatus::Partial);
    assert_eq!(status_of(&db, &rx.id), PrescriptionStatus::PartiallyDispensed);
}

// =============================================================================
// Property: random sequences never exceed the prescription
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_ledger_never_exceeds_prescribed(
        quantities in prop::collection::vec(1u32..12, 1..4),
        attempts in prop::collection::vec((0usize..4, 1u32..8), 1..16),
    ) {
        let mut db = Database::open_in_memory().unwrap();
        let org = seed_pharmacy(&db);
        let rx = prescribe(&mut db, &quantities);
        let audit = MemoryAuditSink::new();
        let config = LedgerConfig::default();
        let actor = pharmacist(&org);

        let mut engine = DispenseEngine::new(&mut db, &audit, &config);
        let mut accepted = 0usize;
        for (index, quantity) in attempts {
            let index = index % quantities.len();
            match engine.dispense(&rx.id, &actor, &request(&rx, &[(index, quantity)])) {
                Ok(_) => accepted += 1,
                Err(CoreError::OverDispense { .. }) => {}
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
        }

        let verification = engine.verify(&rx.id, &actor).unwrap();
        for (item, remaining) in rx.items.iter().zip(&verification.remaining) {
            prop_assert!(remaining.dispensed_quantity <= u64::from(item.quantity));
            prop_assert_eq!(remaining.excess_quantity, 0);
            prop_assert_eq!(
                u64::from(remaining.remaining_quantity) + remaining.dispensed_quantity,
                u64::from(item.quantity)
            );
        }

        let expected = if accepted == 0 {
            PrescriptionStatus::Active
        } else if verification.is_fully_dispensed() {
            PrescriptionStatus::Dispensed
        } else {
            PrescriptionStatus::PartiallyDispensed
        };
        prop_assert_eq!(verification.prescription.status, expected);
        prop_assert_eq!(audit.events().len(), accepted);
    }
}
