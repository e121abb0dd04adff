//! Fire-and-forget audit trail.
//!
//! Audit events are emitted after the business transaction has committed.
//! A failing sink is logged and otherwise ignored: it never rolls back or
//! blocks the operation that produced the event.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::LedgerConfig;
use crate::db::{Database, DbError};

/// Audit errors.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit storage error: {0}")]
    Storage(#[from] DbError),

    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}

/// A structured audit event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub id: String,
    /// e.g. "prescription.dispense"
    pub action: String,
    pub actor_user_id: Option<String>,
    /// e.g. "dispense_record"
    pub target_type: String,
    pub target_id: Option<String>,
    pub org_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: &str, target_type: &str, target_id: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            action: action.to_string(),
            actor_user_id: None,
            target_type: target_type.to_string(),
            target_id,
            org_id: None,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn actor(mut self, user_id: &str) -> Self {
        self.actor_user_id = Some(user_id.to_string());
        self
    }

    pub fn org(mut self, org_id: &str) -> Self {
        self.org_id = Some(org_id.to_string());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Record an event, swallowing (but logging) any sink failure.
pub fn emit(sink: &dyn AuditSink, event: AuditEvent) {
    if let Err(e) = sink.record(&event) {
        warn!(
            action = %event.action,
            target_type = %event.target_type,
            target_id = ?event.target_id,
            error = %e,
            "Audit log failed"
        );
    }
}

/// Keeps events in memory (tests, previews).
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.events
            .lock()
            .map_err(|e| AuditError::Unavailable(format!("Lock poisoned: {}", e)))?
            .push(event.clone());
        Ok(())
    }
}

/// Persists events to the `audit_log` table over its own connection.
pub struct SqliteAuditSink {
    db: Mutex<Database>,
}

impl SqliteAuditSink {
    /// Open the audit connection on the ledger database file.
    pub fn open<P: AsRef<Path>>(path: P, config: &LedgerConfig) -> Result<Self, AuditError> {
        Ok(Self {
            db: Mutex::new(Database::open_with_config(path, config)?),
        })
    }

    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Events recorded for a target, oldest first.
    pub fn events_for(&self, target_type: &str, target_id: &str) -> Result<Vec<AuditEvent>, AuditError> {
        let db = self
            .db
            .lock()
            .map_err(|e| AuditError::Unavailable(format!("Lock poisoned: {}", e)))?;
        Ok(db.store().list_audit_events(target_type, target_id)?)
    }
}

impl AuditSink for SqliteAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let db = self
            .db
            .lock()
            .map_err(|e| AuditError::Unavailable(format!("Lock poisoned: {}", e)))?;
        db.store().insert_audit_event(event)?;
        Ok(())
    }
}
