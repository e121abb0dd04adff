//! Error taxonomy shared by the ledger, access and invite components.

use thiserror::Error;

use crate::db::DbError;

/// Typed outcome of a failed core operation.
///
/// Every variant except `Database`, `DataIntegrity` and `PasswordHash` is a
/// recoverable, caller-facing outcome.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "Over-dispensing is not allowed: item {prescription_item_id} requested {requested}, remaining {remaining}"
    )]
    OverDispense {
        prescription_item_id: String,
        requested: u32,
        remaining: u32,
    },

    #[error("Invite expired")]
    Expired,

    #[error("Conflict: {message}")]
    Conflict { message: String, retryable: bool },

    #[error("Ledger integrity violation: {0}")]
    DataIntegrity(String),

    #[error("Database error: {0}")]
    Database(DbError),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// A duplicate that retrying will not resolve.
    pub fn duplicate(message: impl Into<String>) -> Self {
        CoreError::Conflict {
            message: message.into(),
            retryable: false,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::Forbidden(_) => "FORBIDDEN",
            CoreError::InvalidState(_) => "INVALID_STATE",
            CoreError::InvalidInput(_) => "INVALID_INPUT",
            CoreError::OverDispense { .. } => "OVER_DISPENSE",
            CoreError::Expired => "EXPIRED",
            CoreError::Conflict { .. } => "CONFLICT",
            CoreError::DataIntegrity(_) => "DATA_INTEGRITY",
            CoreError::Database(_) | CoreError::PasswordHash(_) => "INTERNAL",
        }
    }

    /// The caller may re-verify and resubmit.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Conflict { retryable: true, .. })
    }

    /// Over-dispense is reported as a kind of invalid input.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidInput(_) | CoreError::OverDispense { .. }
        )
    }
}

impl From<DbError> for CoreError {
    fn from(e: DbError) -> Self {
        if e.is_busy() {
            CoreError::Conflict {
                message: "concurrent update in progress, retry".into(),
                retryable: true,
            }
        } else {
            CoreError::Database(e)
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::from(e).into()
    }
}
