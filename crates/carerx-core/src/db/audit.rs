//! Audit log database operations.

use rusqlite::params;

use super::{DbResult, Store};
use crate::audit::AuditEvent;

impl Store<'_> {
    pub fn insert_audit_event(&self, event: &AuditEvent) -> DbResult<()> {
        let metadata = serde_json::to_string(&event.metadata)?;
        self.conn.execute(
            r#"
            INSERT INTO audit_log (
                id, action, actor_user_id, target_type, target_id,
                org_id, metadata, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                event.id,
                event.action,
                event.actor_user_id,
                event.target_type,
                event.target_id,
                event.org_id,
                metadata,
                event.created_at,
            ],
        )?;
        Ok(())
    }

    /// Audit events for one target, oldest first.
    pub fn list_audit_events(&self, target_type: &str, target_id: &str) -> DbResult<Vec<AuditEvent>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, action, actor_user_id, target_type, target_id,
                   org_id, metadata, created_at
            FROM audit_log
            WHERE target_type = ? AND target_id = ?
            ORDER BY created_at, rowid
            "#,
        )?;

        let rows = stmt.query_map([target_type, target_id], |row| {
            Ok((
                AuditEvent {
                    id: row.get(0)?,
                    action: row.get(1)?,
                    actor_user_id: row.get(2)?,
                    target_type: row.get(3)?,
                    target_id: row.get(4)?,
                    org_id: row.get(5)?,
                    metadata: serde_json::Value::Null,
                    created_at: row.get(7)?,
                },
                row.get::<_, Option<String>>(6)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (mut event, metadata) = row?;
            if let Some(json) = metadata {
                event.metadata = serde_json::from_str(&json)?;
            }
            events.push(event);
        }
        Ok(events)
    }
}
