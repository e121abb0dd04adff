//! Prescription database operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{parse_enum, Database, DbError, DbResult, Store};
use crate::models::{Prescription, PrescriptionItem, PrescriptionStatus};

impl Store<'_> {
    /// Insert a prescription with its items. Call inside a transaction.
    pub fn insert_prescription(&self, prescription: &Prescription) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO prescriptions (id, patient_id, doctor_id, status, notes, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                prescription.id,
                prescription.patient_id,
                prescription.doctor_id,
                prescription.status.as_str(),
                prescription.notes,
                prescription.created_at,
            ],
        )?;

        let mut stmt = self.conn.prepare(
            r#"
            INSERT INTO prescription_items (
                id, prescription_id, position, medicine_id, dose,
                frequency, duration_days, quantity
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )?;
        for (position, item) in prescription.items.iter().enumerate() {
            stmt.execute(params![
                item.id,
                prescription.id,
                position as i64,
                item.medicine_id,
                item.dose,
                item.frequency,
                item.duration_days,
                item.quantity,
            ])?;
        }
        Ok(())
    }

    /// Get a prescription with its items in creation order.
    pub fn get_prescription(&self, id: &str) -> DbResult<Option<Prescription>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT id, patient_id, doctor_id, status, notes, created_at
                FROM prescriptions
                WHERE id = ?
                "#,
                [id],
                PrescriptionRow::from_row,
            )
            .optional()?;

        match row {
            Some(row) => {
                let items = self.get_prescription_items(&row.id)?;
                Ok(Some(row.into_prescription(items)?))
            }
            None => Ok(None),
        }
    }

    /// Items of a prescription in creation order.
    pub fn get_prescription_items(&self, prescription_id: &str) -> DbResult<Vec<PrescriptionItem>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, prescription_id, medicine_id, dose, frequency, duration_days, quantity
            FROM prescription_items
            WHERE prescription_id = ?
            ORDER BY position
            "#,
        )?;

        let rows = stmt.query_map([prescription_id], |row| {
            Ok(PrescriptionItem {
                id: row.get(0)?,
                prescription_id: row.get(1)?,
                medicine_id: row.get(2)?,
                dose: row.get(3)?,
                frequency: row.get(4)?,
                duration_days: row.get(5)?,
                quantity: row.get(6)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// List all prescriptions of a patient, newest first.
    pub fn list_prescriptions_for_patient(&self, patient_id: &str) -> DbResult<Vec<Prescription>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, patient_id, doctor_id, status, notes, created_at
            FROM prescriptions
            WHERE patient_id = ?
            ORDER BY created_at DESC
            "#,
        )?;

        let rows = stmt.query_map([patient_id], PrescriptionRow::from_row)?;

        let mut prescriptions = Vec::new();
        for row in rows {
            let row = row?;
            let items = self.get_prescription_items(&row.id)?;
            prescriptions.push(row.into_prescription(items)?);
        }
        Ok(prescriptions)
    }

    /// Move a prescription from `from` to `to`.
    ///
    /// Returns false when the stored status is no longer `from`.
    pub fn update_prescription_status(
        &self,
        id: &str,
        from: PrescriptionStatus,
        to: PrescriptionStatus,
    ) -> DbResult<bool> {
        if !from.can_transition_to(to) {
            return Err(DbError::Constraint(format!(
                "prescription cannot move from {} to {}",
                from.as_str(),
                to.as_str()
            )));
        }

        let rows_affected = self.conn.execute(
            "UPDATE prescriptions SET status = ?3 WHERE id = ?1 AND status = ?2",
            params![id, from.as_str(), to.as_str()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Cancel a prescription that has not been fully dispensed.
    pub fn cancel_prescription(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE prescriptions SET status = 'CANCELLED'
            WHERE id = ? AND status IN ('ACTIVE', 'PARTIALLY_DISPENSED')
            "#,
            [id],
        )?;
        Ok(rows_affected > 0)
    }
}

impl Database {
    /// Insert a prescription and its items atomically.
    pub fn insert_prescription(&mut self, prescription: &Prescription) -> DbResult<()> {
        let tx = self.transaction()?;
        Store::new(&tx).insert_prescription(prescription)?;
        tx.commit()?;
        Ok(())
    }
}

/// Internal row type for prescription queries.
struct PrescriptionRow {
    id: String,
    patient_id: String,
    doctor_id: String,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl PrescriptionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            doctor_id: row.get(2)?,
            status: row.get(3)?,
            notes: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_prescription(self, items: Vec<PrescriptionItem>) -> DbResult<Prescription> {
        Ok(Prescription {
            status: parse_enum("prescription status", &self.status, PrescriptionStatus::parse)?,
            id: self.id,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            notes: self.notes,
            items,
            created_at: self.created_at,
        })
    }
}
