//! Database layer for the dispensing ledger.
//!
//! [`Database`] owns a connection; [`Store`] runs queries against any
//! `&Connection`, so the same operations work inside an open transaction.

mod schema;
mod directory;
mod dispenses;
mod invites;
mod prescriptions;
mod audit;

pub use schema::*;
#[allow(unused_imports)]
pub use directory::*;
#[allow(unused_imports)]
pub use dispenses::*;

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use thiserror::Error;

use crate::config::LedgerConfig;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

impl DbError {
    /// Lock contention that outlived the busy timeout.
    pub fn is_busy(&self) -> bool {
        match self {
            DbError::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        Self::open_with_config(path, &LedgerConfig::default())
    }

    /// Open database at path with explicit settings.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: &LedgerConfig) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        // Set before WAL: switching journal mode takes a lock other
        // connections may hold
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        let db = Self { conn };
        db.initialize(config)?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize(&LedgerConfig::default())?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self, config: &LedgerConfig) -> DbResult<()> {
        self.conn
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Queries against the connection outside any transaction.
    pub fn store(&self) -> Store<'_> {
        Store::new(&self.conn)
    }

    /// Begin a deferred transaction.
    pub fn transaction(&mut self) -> DbResult<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Begin a write transaction that takes the write lock up front.
    ///
    /// Concurrent writers on other connections wait (up to the busy timeout)
    /// and then observe everything this transaction committed.
    pub fn write_transaction(&mut self) -> DbResult<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

/// Typed queries over a connection or an open transaction.
#[derive(Clone, Copy)]
pub struct Store<'c> {
    conn: &'c Connection,
}

impl<'c> Store<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

/// Parse a stored enum value, rejecting unknown strings.
pub(crate) fn parse_enum<T>(
    column: &str,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> DbResult<T> {
    parse(value).ok_or_else(|| DbError::Constraint(format!("unknown {} '{}'", column, value)))
}
