//! SQLite schema definition.

/// Complete database schema for the dispensing ledger.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Directory
-- ============================================================================

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,                  -- stored lowercase
    password_hash TEXT NOT NULL,
    global_role TEXT NOT NULL DEFAULT 'USER' CHECK (global_role IN ('ROOT_ADMIN', 'USER')),
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS organizations (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    org_type TEXT NOT NULL CHECK (org_type IN ('HOSPITAL', 'CLINIC', 'PHARMACY', 'LAB')),
    domain TEXT,                                 -- invite email domain allow-list
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS org_members (
    user_id TEXT NOT NULL REFERENCES users(id),
    org_id TEXT NOT NULL REFERENCES organizations(id),
    role TEXT NOT NULL CHECK (role IN ('ADMIN', 'DOCTOR', 'PHARMACIST', 'LAB_TECH')),
    created_at TEXT NOT NULL,
    PRIMARY KEY (user_id, org_id)
);

CREATE INDEX IF NOT EXISTS idx_org_members_org ON org_members(org_id);

CREATE TABLE IF NOT EXISTS guardian_links (
    patient_id TEXT NOT NULL REFERENCES users(id),
    guardian_id TEXT NOT NULL REFERENCES users(id),
    status TEXT NOT NULL DEFAULT 'ACTIVE' CHECK (status IN ('ACTIVE', 'REVOKED')),
    created_at TEXT NOT NULL,
    PRIMARY KEY (patient_id, guardian_id),
    CHECK (patient_id != guardian_id)
);

CREATE INDEX IF NOT EXISTS idx_guardian_links_guardian ON guardian_links(guardian_id);

-- ============================================================================
-- Invites (guardian + organization share one state machine)
-- ============================================================================

CREATE TABLE IF NOT EXISTS invites (
    id TEXT PRIMARY KEY,
    token_hash TEXT NOT NULL UNIQUE,             -- SHA-256 of the raw token
    email TEXT NOT NULL,                         -- stored lowercase
    kind TEXT NOT NULL CHECK (kind IN ('guardian', 'organization')),
    patient_id TEXT REFERENCES users(id),        -- guardian invites
    org_id TEXT REFERENCES organizations(id),    -- organization invites
    role TEXT,                                   -- organization invites
    status TEXT NOT NULL DEFAULT 'PENDING' CHECK (status IN ('PENDING', 'ACCEPTED', 'EXPIRED')),
    invited_by TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    CHECK (
        (kind = 'guardian' AND patient_id IS NOT NULL AND org_id IS NULL AND role IS NULL)
        OR (kind = 'organization' AND org_id IS NOT NULL AND role IS NOT NULL AND patient_id IS NULL)
    )
);

CREATE INDEX IF NOT EXISTS idx_invites_email ON invites(email, status);

-- Status leaves PENDING at most once
CREATE TRIGGER IF NOT EXISTS invites_status_forward BEFORE UPDATE OF status ON invites
WHEN old.status != 'PENDING' AND new.status != old.status
BEGIN
    SELECT RAISE(ABORT, 'Invite status is final');
END;

-- ============================================================================
-- Prescriptions (immutable except for status)
-- ============================================================================

CREATE TABLE IF NOT EXISTS prescriptions (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    doctor_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'ACTIVE'
        CHECK (status IN ('ACTIVE', 'PARTIALLY_DISPENSED', 'DISPENSED', 'CANCELLED')),
    notes TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_prescriptions_patient ON prescriptions(patient_id);

CREATE TRIGGER IF NOT EXISTS prescriptions_status_forward BEFORE UPDATE OF status ON prescriptions
WHEN (old.status IN ('DISPENSED', 'CANCELLED') AND new.status != old.status)
    OR (old.status = 'PARTIALLY_DISPENSED' AND new.status = 'ACTIVE')
BEGIN
    SELECT RAISE(ABORT, 'Prescription status is final');
END;

CREATE TRIGGER IF NOT EXISTS prescriptions_immutable BEFORE UPDATE OF id, patient_id, doctor_id, notes, created_at ON prescriptions
BEGIN
    SELECT RAISE(ABORT, 'Prescriptions are immutable');
END;

CREATE TABLE IF NOT EXISTS prescription_items (
    id TEXT PRIMARY KEY,
    prescription_id TEXT NOT NULL REFERENCES prescriptions(id),
    position INTEGER NOT NULL,
    medicine_id TEXT NOT NULL,
    dose TEXT NOT NULL,
    frequency TEXT NOT NULL,
    duration_days INTEGER NOT NULL CHECK (duration_days > 0),
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    UNIQUE (prescription_id, position)
);

-- Items are only added while the prescription is new
CREATE TRIGGER IF NOT EXISTS prescription_items_insert_while_new BEFORE INSERT ON prescription_items
WHEN (SELECT status FROM prescriptions WHERE id = new.prescription_id) != 'ACTIVE'
    OR EXISTS (SELECT 1 FROM dispense_records WHERE prescription_id = new.prescription_id)
BEGIN
    SELECT RAISE(ABORT, 'Prescription items are fixed once dispensing starts');
END;

CREATE TRIGGER IF NOT EXISTS prescription_items_no_update BEFORE UPDATE ON prescription_items
BEGIN
    SELECT RAISE(ABORT, 'Prescription items are immutable');
END;

CREATE TRIGGER IF NOT EXISTS prescription_items_no_delete BEFORE DELETE ON prescription_items
BEGIN
    SELECT RAISE(ABORT, 'Prescription items are immutable');
END;

-- ============================================================================
-- Dispense Ledger (Append-Only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS dispense_records (
    id TEXT PRIMARY KEY,
    prescription_id TEXT NOT NULL REFERENCES prescriptions(id),
    dispensed_by_id TEXT NOT NULL,
    pharmacy_org_id TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('PARTIAL', 'FULL')),
    notes TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_dispense_records_prescription ON dispense_records(prescription_id);

CREATE TABLE IF NOT EXISTS dispense_items (
    id TEXT PRIMARY KEY,
    dispense_record_id TEXT NOT NULL REFERENCES dispense_records(id),
    prescription_item_id TEXT NOT NULL REFERENCES prescription_items(id),
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    UNIQUE (dispense_record_id, prescription_item_id)
);

CREATE INDEX IF NOT EXISTS idx_dispense_items_item ON dispense_items(prescription_item_id);

CREATE TRIGGER IF NOT EXISTS dispense_records_no_update BEFORE UPDATE ON dispense_records
BEGIN
    SELECT RAISE(ABORT, 'Dispense records are append-only');
END;

CREATE TRIGGER IF NOT EXISTS dispense_records_no_delete BEFORE DELETE ON dispense_records
BEGIN
    SELECT RAISE(ABORT, 'Dispense records are append-only');
END;

CREATE TRIGGER IF NOT EXISTS dispense_items_no_update BEFORE UPDATE ON dispense_items
BEGIN
    SELECT RAISE(ABORT, 'Dispense items are append-only');
END;

CREATE TRIGGER IF NOT EXISTS dispense_items_no_delete BEFORE DELETE ON dispense_items
BEGIN
    SELECT RAISE(ABORT, 'Dispense items are append-only');
END;

-- Last line of defence for the per-item quantity invariant
CREATE TRIGGER IF NOT EXISTS dispense_items_within_prescribed BEFORE INSERT ON dispense_items
WHEN (
    SELECT COALESCE(SUM(quantity), 0) FROM dispense_items
    WHERE prescription_item_id = new.prescription_item_id
) + new.quantity > (
    SELECT quantity FROM prescription_items WHERE id = new.prescription_item_id
)
BEGIN
    SELECT RAISE(ABORT, 'Dispensed quantity exceeds prescribed quantity');
END;

-- ============================================================================
-- Audit Log
-- ============================================================================

CREATE TABLE IF NOT EXISTS audit_log (
    id TEXT PRIMARY KEY,
    action TEXT NOT NULL,
    actor_user_id TEXT,
    target_type TEXT NOT NULL,
    target_id TEXT,
    org_id TEXT,
    metadata TEXT,                               -- JSON object
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_log_target ON audit_log(target_type, target_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO prescriptions (id, patient_id, doctor_id, created_at)
            VALUES ('rx1', 'patient', 'doctor', '2024-01-01 00:00:00+00:00');
            INSERT INTO prescription_items (id, prescription_id, position, medicine_id, dose, frequency, duration_days, quantity)
            VALUES ('item1', 'rx1', 0, 'med', '1 tablet', 'daily', 5, 10);
            INSERT INTO dispense_records (id, prescription_id, dispensed_by_id, pharmacy_org_id, status, created_at)
            VALUES ('d1', 'rx1', 'pharmacist', 'pharmacy', 'PARTIAL', '2024-01-02 00:00:00+00:00');
            "#,
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_dispense_items_cannot_exceed_prescribed() {
        let conn = setup();

        let result = conn.execute(
            "INSERT INTO dispense_items (id, dispense_record_id, prescription_item_id, quantity) VALUES ('di1', 'd1', 'item1', 11)",
            [],
        );
        assert!(result.is_err());

        let result = conn.execute(
            "INSERT INTO dispense_items (id, dispense_record_id, prescription_item_id, quantity) VALUES ('di1', 'd1', 'item1', 10)",
            [],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_ledger_is_append_only() {
        let conn = setup();
        conn.execute(
            "INSERT INTO dispense_items (id, dispense_record_id, prescription_item_id, quantity) VALUES ('di1', 'd1', 'item1', 4)",
            [],
        )
        .unwrap();

        assert!(conn
            .execute("UPDATE dispense_items SET quantity = 1 WHERE id = 'di1'", [])
            .is_err());
        assert!(conn
            .execute("DELETE FROM dispense_items WHERE id = 'di1'", [])
            .is_err());
        assert!(conn
            .execute("UPDATE dispense_records SET status = 'FULL' WHERE id = 'd1'", [])
            .is_err());
        assert!(conn
            .execute("DELETE FROM dispense_records WHERE id = 'd1'", [])
            .is_err());
    }

    #[test]
    fn test_prescription_status_is_forward_only() {
        let conn = setup();
        conn.execute("UPDATE prescriptions SET status = 'DISPENSED' WHERE id = 'rx1'", [])
            .unwrap();
        assert!(conn
            .execute("UPDATE prescriptions SET status = 'ACTIVE' WHERE id = 'rx1'", [])
            .is_err());
        assert!(conn
            .execute("UPDATE prescription_items SET quantity = 20 WHERE id = 'item1'", [])
            .is_err());
    }

    #[test]
    fn test_invite_status_is_final() {
        let conn = setup();
        conn.execute_batch(
            r#"
            INSERT INTO users (id, email, password_hash, created_at)
            VALUES ('patient', 'p@example.com', 'x', '2024-01-01 00:00:00+00:00');
            INSERT INTO invites (id, token_hash, email, kind, patient_id, invited_by, expires_at, created_at)
            VALUES ('inv1', 'hash', 'g@example.com', 'guardian', 'patient', 'patient',
                    '2024-01-08 00:00:00+00:00', '2024-01-01 00:00:00+00:00');
            UPDATE invites SET status = 'ACCEPTED' WHERE id = 'inv1';
            "#,
        )
        .unwrap();

        assert!(conn
            .execute("UPDATE invites SET status = 'PENDING' WHERE id = 'inv1'", [])
            .is_err());
    }
}
