//! Dispense ledger database operations.
//!
//! The ledger is append-only: there is no update or delete path here, and the
//! schema triggers reject one if attempted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::{parse_enum, DbResult, Store};
use crate::models::{DispenseItem, DispenseRecord, DispenseStatus};

impl Store<'_> {
    /// Append a dispense record with its items. Call inside a transaction.
    pub fn insert_dispense_record(&self, record: &DispenseRecord) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO dispense_records (
                id, prescription_id, dispensed_by_id, pharmacy_org_id,
                status, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                record.id,
                record.prescription_id,
                record.dispensed_by_id,
                record.pharmacy_org_id,
                record.status.as_str(),
                record.notes,
                record.created_at,
            ],
        )?;

        let mut stmt = self.conn.prepare(
            r#"
            INSERT INTO dispense_items (id, dispense_record_id, prescription_item_id, quantity)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )?;
        for item in &record.items {
            stmt.execute(params![
                item.id,
                record.id,
                item.prescription_item_id,
                item.quantity,
            ])?;
        }
        Ok(())
    }

    /// Total dispensed quantity per prescription item across the whole ledger.
    ///
    /// Items that were never dispensed are absent from the map.
    pub fn dispensed_totals(&self, prescription_id: &str) -> DbResult<HashMap<String, u64>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT di.prescription_item_id, SUM(di.quantity)
            FROM dispense_items di
            JOIN dispense_records dr ON dr.id = di.dispense_record_id
            WHERE dr.prescription_id = ?
            GROUP BY di.prescription_item_id
            "#,
        )?;

        let rows = stmt.query_map([prescription_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;

        rows.collect::<Result<HashMap<_, _>, _>>().map_err(Into::into)
    }

    /// Dispense records of a prescription with their items, newest first.
    pub fn list_dispense_records(&self, prescription_id: &str) -> DbResult<Vec<DispenseRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, prescription_id, dispensed_by_id, pharmacy_org_id,
                   status, notes, created_at
            FROM dispense_records
            WHERE prescription_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )?;

        let rows = stmt.query_map([prescription_id], |row| {
            Ok(DispenseRecordRow {
                id: row.get(0)?,
                prescription_id: row.get(1)?,
                dispensed_by_id: row.get(2)?,
                pharmacy_org_id: row.get(3)?,
                status: row.get(4)?,
                notes: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            let row = row?;
            let items = self.get_dispense_items(&row.id)?;
            records.push(row.into_record(items)?);
        }
        Ok(records)
    }

    /// Number of dispense records of a prescription.
    pub fn count_dispense_records(&self, prescription_id: &str) -> DbResult<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM dispense_records WHERE prescription_id = ?",
            [prescription_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn get_dispense_items(&self, dispense_record_id: &str) -> DbResult<Vec<DispenseItem>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, dispense_record_id, prescription_item_id, quantity
            FROM dispense_items
            WHERE dispense_record_id = ?
            ORDER BY rowid
            "#,
        )?;

        let rows = stmt.query_map([dispense_record_id], dispense_item_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

fn dispense_item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DispenseItem> {
    Ok(DispenseItem {
        id: row.get(0)?,
        dispense_record_id: row.get(1)?,
        prescription_item_id: row.get(2)?,
        quantity: row.get(3)?,
    })
}

/// Internal row type for dispense record queries.
struct DispenseRecordRow {
    id: String,
    prescription_id: String,
    dispensed_by_id: String,
    pharmacy_org_id: String,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl DispenseRecordRow {
    fn into_record(self, items: Vec<DispenseItem>) -> DbResult<DispenseRecord> {
        Ok(DispenseRecord {
            status: parse_enum("dispense status", &self.status, DispenseStatus::parse)?,
            id: self.id,
            prescription_id: self.prescription_id,
            dispensed_by_id: self.dispensed_by_id,
            pharmacy_org_id: self.pharmacy_org_id,
            notes: self.notes,
            items,
            created_at: self.created_at,
        })
    }
}
