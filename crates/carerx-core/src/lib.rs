//! Carerx Core Library
//!
//! Prescription dispensing ledger, patient-record access predicates and the
//! guardian / organization invite lifecycle, on local SQLite.
//!
//! # Architecture
//!
//! ```text
//!  Doctor ──► Prescription (items, fixed quantities)
//!                  │
//!   Pharmacist ──► verify ──► remaining per item (advisory)
//!                  │
//!   Pharmacist ──► dispense
//!                  │   BEGIN IMMEDIATE
//!                  │   re-derive remaining from the full ledger
//!                  │   reject over-dispense
//!                  │   append DispenseRecord + items
//!                  │   advance prescription status
//!                  │   COMMIT
//!                  ▼
//!             audit event (best effort)
//! ```
//!
//! # Core Principle
//!
//! **The ledger is the only source of truth for what is left.** Nothing is
//! cached between verify and dispense; every dispense recomputes inside its
//! own write transaction.
//!
//! # Modules
//!
//! - [`db`]: SQLite schema and typed queries
//! - [`models`]: Domain types (Prescription, DispenseRecord, Invite, etc.)
//! - [`access`]: Access predicates over an authenticated actor
//! - [`ledger`]: Remaining-quantity calculation and dispense reconciliation
//! - [`invites`]: Guardian and organization invites
//! - [`audit`]: Fire-and-forget audit sinks
//! - [`config`]: Runtime settings
//! - [`telemetry`]: Tracing subscriber setup

pub mod access;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod invites;
pub mod ledger;
pub mod models;
pub mod telemetry;

// Re-export commonly used types
pub use access::{AccessEvaluator, ClinicalGrant, Directory};
pub use audit::{AuditEvent, AuditSink, MemoryAuditSink, SqliteAuditSink};
pub use config::LedgerConfig;
pub use db::Database;
pub use error::{CoreError, CoreResult};
pub use invites::{Argon2Hasher, InviteService, PasswordHasher};
pub use ledger::{
    compute_remaining, DispenseEngine, DispenseRequest, RequestedItem, Verification,
};
pub use models::{
    Actor, DispenseItem, DispenseRecord, DispenseStatus, GlobalRole, OrgRole, OrgType,
    Prescription, PrescriptionItem, PrescriptionStatus, RemainingItem,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

use chrono::Utc;

use models::{
    Invite, IssuedInvite, Membership, NewPrescription, NewPrescriptionItem, OrgMember,
    Organization, Principal, User,
};

// =========================================================================
// FFI Error Type
// =========================================================================

/// Mirrors [`CoreError`] one-to-one so hosts can branch on the kind.
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum CarerxError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Over-dispensing is not allowed: item {prescription_item_id} requested {requested}, remaining {remaining}")]
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

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CoreError> for CarerxError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::NotFound { .. } => CarerxError::NotFound(e.to_string()),
            CoreError::Forbidden(msg) => CarerxError::Forbidden(msg),
            CoreError::InvalidState(msg) => CarerxError::InvalidState(msg),
            CoreError::InvalidInput(msg) => CarerxError::InvalidInput(msg),
            CoreError::OverDispense {
                prescription_item_id,
                requested,
                remaining,
            } => CarerxError::OverDispense {
                prescription_item_id,
                requested,
                remaining,
            },
            CoreError::Expired => CarerxError::Expired,
            CoreError::Conflict { message, retryable } => CarerxError::Conflict { message, retryable },
            CoreError::DataIntegrity(msg) => CarerxError::DataIntegrity(msg),
            CoreError::Database(_) | CoreError::PasswordHash(_) => {
                CarerxError::Internal(e.to_string())
            }
        }
    }
}

impl From<db::DbError> for CarerxError {
    fn from(e: db::DbError) -> Self {
        CoreError::from(e).into()
    }
}

impl From<rusqlite::Error> for CarerxError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::from(e).into()
    }
}

impl From<config::ConfigError> for CarerxError {
    fn from(e: config::ConfigError) -> Self {
        CarerxError::InvalidInput(e.to_string())
    }
}

impl From<audit::AuditError> for CarerxError {
    fn from(e: audit::AuditError) -> Self {
        CarerxError::Internal(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for CarerxError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        CarerxError::Internal(format!("Lock poisoned: {}", e))
    }
}

impl CarerxError {
    /// Same stable code as [`CoreError::code`].
    pub fn code(&self) -> &'static str {
        match self {
            CarerxError::NotFound(_) => "NOT_FOUND",
            CarerxError::Forbidden(_) => "FORBIDDEN",
            CarerxError::InvalidState(_) => "INVALID_STATE",
            CarerxError::InvalidInput(_) => "INVALID_INPUT",
            CarerxError::OverDispense { .. } => "OVER_DISPENSE",
            CarerxError::Expired => "EXPIRED",
            CarerxError::Conflict { .. } => "CONFLICT",
            CarerxError::DataIntegrity(_) => "DATA_INTEGRITY",
            CarerxError::Internal(_) => "INTERNAL",
        }
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path, with settings from the
/// environment.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<CarerxCore>, CarerxError> {
    let config = LedgerConfig::from_env()?;
    open_database_with_config(path, config.into())
}

/// Open or create a database at the given path with explicit settings.
#[uniffi::export]
pub fn open_database_with_config(
    path: String,
    config: FfiLedgerConfig,
) -> Result<Arc<CarerxCore>, CarerxError> {
    let config: LedgerConfig = config.into();
    let db = Database::open_with_config(&path, &config)?;
    // Audit writes go through their own connection, after the ledger commit
    let audit = SqliteAuditSink::open(&path, &config)?;
    CarerxCore::new(db, audit, config)
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<CarerxCore>, CarerxError> {
    let db = Database::open_in_memory()?;
    let audit = SqliteAuditSink::new(Database::open_in_memory()?);
    CarerxCore::new(db, audit, LedgerConfig::default())
}

/// Install the tracing subscriber. Returns false if one was already set.
#[uniffi::export]
pub fn init_logging(filter: Option<String>) -> bool {
    telemetry::init_tracing(filter.as_deref())
}

/// Remaining quantities for a prescription's items given its dispense history.
#[uniffi::export]
pub fn compute_remaining_quantities(
    items: Vec<FfiPrescriptionItem>,
    history: Vec<FfiDispenseItem>,
) -> Vec<FfiRemainingItem> {
    let items: Vec<PrescriptionItem> = items.into_iter().map(Into::into).collect();
    let history: Vec<DispenseItem> = history.into_iter().map(Into::into).collect();
    compute_remaining(&items, &history)
        .into_iter()
        .map(Into::into)
        .collect()
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe ledger handle for FFI.
#[derive(uniffi::Object)]
pub struct CarerxCore {
    db: Arc<Mutex<Database>>,
    audit: SqliteAuditSink,
    hasher: Argon2Hasher,
    config: LedgerConfig,
}

impl CarerxCore {
    fn new(
        db: Database,
        audit: SqliteAuditSink,
        config: LedgerConfig,
    ) -> Result<Arc<Self>, CarerxError> {
        Ok(Arc::new(Self {
            db: Arc::new(Mutex::new(db)),
            audit,
            hasher: Argon2Hasher::new()?,
            config,
        }))
    }
}

#[uniffi::export]
impl CarerxCore {
    // =========================================================================
    // Directory Operations
    // =========================================================================

    /// Register a user directly (bootstrap, e.g. the first ROOT_ADMIN).
    pub fn create_user(
        &self,
        email: String,
        password: String,
        global_role: String,
    ) -> Result<FfiUser, CarerxError> {
        let global_role = parse_field("global role", &global_role, GlobalRole::parse)?;
        let email = invites::EmailAddress::parse(&email)?;
        if password.chars().count() < self.config.min_password_length {
            return Err(CarerxError::InvalidInput(format!(
                "password must be at least {} characters",
                self.config.min_password_length
            )));
        }
        let hash = self.hasher.hash(&password)?;

        let db = self.db.lock()?;
        if db.store().find_user_by_email(email.as_str())?.is_some() {
            return Err(CoreError::duplicate(format!("{} is already registered", email)).into());
        }
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.to_string(),
            global_role,
            created_at: Utc::now(),
        };
        db.store().insert_user(&user, &hash)?;
        Ok(user.into())
    }

    /// Create an organization. ROOT_ADMIN only.
    pub fn create_organization(
        &self,
        actor: FfiActor,
        name: String,
        org_type: String,
        domain: Option<String>,
    ) -> Result<FfiOrganization, CarerxError> {
        let actor = Actor::try_from(actor)?;
        if !actor.is_root_admin() {
            return Err(CarerxError::Forbidden(
                "only administrators can create organizations".into(),
            ));
        }
        let org_type = parse_field("organization type", &org_type, OrgType::parse)?;
        if name.trim().is_empty() {
            return Err(CarerxError::InvalidInput("organization name is required".into()));
        }

        let db = self.db.lock()?;
        let org = Organization::new(name.trim().to_string(), org_type, domain);
        db.store().insert_organization(&org)?;
        Ok(org.into())
    }

    /// Memberships of a user, to build an actor context.
    pub fn list_memberships(&self, user_id: String) -> Result<Vec<FfiMembership>, CarerxError> {
        let db = self.db.lock()?;
        let members = db.store().list_memberships(&user_id)?;
        Ok(members.into_iter().map(Into::into).collect())
    }

    // =========================================================================
    // Prescription Operations
    // =========================================================================

    /// Write a prescription as the acting doctor.
    pub fn create_prescription(
        &self,
        actor: FfiActor,
        prescription: FfiNewPrescription,
    ) -> Result<FfiPrescription, CarerxError> {
        let actor = Actor::try_from(actor)?;
        if !actor.has_role(OrgRole::Doctor) {
            return Err(CarerxError::Forbidden(
                "only doctors can write prescriptions".into(),
            ));
        }

        let prescription = NewPrescription {
            patient_id: prescription.patient_id,
            doctor_id: actor.user_id.clone(),
            notes: prescription.notes,
            items: prescription.items.into_iter().map(Into::into).collect(),
        }
        .into_prescription()?;

        let mut db = self.db.lock()?;
        db.insert_prescription(&prescription)?;
        Ok(prescription.into())
    }

    /// Prescriptions of a patient, newest first.
    ///
    /// Readable by the patient, their guardians, doctors and administrators.
    pub fn list_patient_prescriptions(
        &self,
        actor: FfiActor,
        patient_id: String,
    ) -> Result<Vec<FfiPrescription>, CarerxError> {
        let actor = Actor::try_from(actor)?;
        let db = self.db.lock()?;
        let store = db.store();
        let allowed = AccessEvaluator::new(&store).can_read_patient_record(
            &actor,
            &patient_id,
            ClinicalGrant::Prescriptions,
        )?;
        if !allowed {
            return Err(CarerxError::Forbidden(
                "not allowed to view this patient's prescriptions".into(),
            ));
        }
        let prescriptions = store.list_prescriptions_for_patient(&patient_id)?;
        Ok(prescriptions.into_iter().map(Into::into).collect())
    }

    /// Cancel a prescription. ROOT_ADMIN or the prescribing doctor.
    pub fn cancel_prescription(
        &self,
        actor: FfiActor,
        prescription_id: String,
    ) -> Result<(), CarerxError> {
        let actor = Actor::try_from(actor)?;
        let mut db = self.db.lock()?;
        let tx = db.write_transaction()?;
        let store = db::Store::new(&tx);

        let prescription = store
            .get_prescription(&prescription_id)?
            .ok_or_else(|| CoreError::not_found("Prescription", prescription_id.as_str()))?;
        if !actor.is_root_admin() && actor.user_id != prescription.doctor_id {
            return Err(CarerxError::Forbidden(
                "only the prescribing doctor can cancel".into(),
            ));
        }
        if !prescription.status.accepts_cancel()
            || !store.cancel_prescription(&prescription.id)?
        {
            return Err(CarerxError::InvalidState(format!(
                "prescription {} is {} and cannot be cancelled",
                prescription.id,
                prescription.status.as_str()
            )));
        }
        tx.commit()?;

        tracing::info!(
            prescription = %prescription.id,
            actor = %actor.user_id,
            "Prescription cancelled"
        );
        audit::emit(
            &self.audit,
            AuditEvent::new("prescription.cancel", "prescription", Some(prescription.id))
                .actor(&actor.user_id),
        );
        Ok(())
    }

    // =========================================================================
    // Dispense Operations
    // =========================================================================

    /// Remaining quantities of a prescription (advisory, never writes).
    pub fn verify(
        &self,
        actor: FfiActor,
        prescription_id: String,
    ) -> Result<FfiVerification, CarerxError> {
        let actor = Actor::try_from(actor)?;
        let mut db = self.db.lock()?;
        let mut engine = DispenseEngine::new(&mut db, &self.audit, &self.config);
        Ok(engine.verify(&prescription_id, &actor)?.into())
    }

    /// Record a dispense against a prescription.
    pub fn dispense(
        &self,
        actor: FfiActor,
        prescription_id: String,
        request: FfiDispenseRequest,
    ) -> Result<FfiDispenseRecord, CarerxError> {
        let actor = Actor::try_from(actor)?;
        let request: DispenseRequest = request.into();
        let mut db = self.db.lock()?;
        let mut engine = DispenseEngine::new(&mut db, &self.audit, &self.config);
        Ok(engine.dispense(&prescription_id, &actor, &request)?.into())
    }

    /// Dispense records of a prescription, newest first.
    pub fn dispense_history(
        &self,
        actor: FfiActor,
        prescription_id: String,
    ) -> Result<Vec<FfiDispenseRecord>, CarerxError> {
        let actor = Actor::try_from(actor)?;
        let mut db = self.db.lock()?;
        let mut engine = DispenseEngine::new(&mut db, &self.audit, &self.config);
        let records = engine.history(&prescription_id, &actor)?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    // =========================================================================
    // Access Predicates
    // =========================================================================

    pub fn can_access_patient_record(
        &self,
        actor: FfiActor,
        patient_id: String,
    ) -> Result<bool, CarerxError> {
        let actor = Actor::try_from(actor)?;
        let db = self.db.lock()?;
        let store = db.store();
        Ok(AccessEvaluator::new(&store).can_access_patient_record(&actor, &patient_id)?)
    }

    /// Pharmacy the actor would dispense for, if any.
    pub fn can_dispense(&self, actor: FfiActor) -> Result<Option<String>, CarerxError> {
        let actor = Actor::try_from(actor)?;
        let db = self.db.lock()?;
        let store = db.store();
        Ok(AccessEvaluator::new(&store).can_dispense(&actor, None)?)
    }

    // =========================================================================
    // Invite Operations
    // =========================================================================

    pub fn create_guardian_invite(
        &self,
        actor: FfiActor,
        patient_id: String,
        email: String,
    ) -> Result<FfiIssuedInvite, CarerxError> {
        let actor = Actor::try_from(actor)?;
        let mut db = self.db.lock()?;
        let mut service = InviteService::new(&mut db, &self.hasher, &self.audit, &self.config);
        Ok(service
            .create_guardian_invite(&actor, &patient_id, &email)?
            .into())
    }

    pub fn create_org_invite(
        &self,
        actor: FfiActor,
        org_id: String,
        email: String,
        role: String,
    ) -> Result<FfiIssuedInvite, CarerxError> {
        let actor = Actor::try_from(actor)?;
        let role = parse_field("organization role", &role, OrgRole::parse)?;
        let mut db = self.db.lock()?;
        let mut service = InviteService::new(&mut db, &self.hasher, &self.audit, &self.config);
        Ok(service
            .create_org_invite(&actor, &org_id, &email, role)?
            .into())
    }

    /// Redeem an invite token, creating the account if needed.
    pub fn accept_invite(&self, token: String, password: String) -> Result<FfiPrincipal, CarerxError> {
        let mut db = self.db.lock()?;
        let mut service = InviteService::new(&mut db, &self.hasher, &self.audit, &self.config);
        Ok(service.accept_invite(&token, &password)?.into())
    }

    pub fn revoke_guardian(
        &self,
        actor: FfiActor,
        patient_id: String,
        guardian_id: String,
    ) -> Result<(), CarerxError> {
        let actor = Actor::try_from(actor)?;
        let mut db = self.db.lock()?;
        let mut service = InviteService::new(&mut db, &self.hasher, &self.audit, &self.config);
        Ok(service.revoke_guardian(&actor, &patient_id, &guardian_id)?)
    }

    // =========================================================================
    // Audit
    // =========================================================================

    /// Audit events recorded for a target, oldest first.
    pub fn audit_events(
        &self,
        target_type: String,
        target_id: String,
    ) -> Result<Vec<FfiAuditEvent>, CarerxError> {
        let events = self.audit.events_for(&target_type, &target_id)?;
        Ok(events.into_iter().map(Into::into).collect())
    }
}

fn parse_field<T>(
    field: &str,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, CarerxError> {
    parse(value).ok_or_else(|| CarerxError::InvalidInput(format!("unknown {} '{}'", field, value)))
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe ledger settings.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLedgerConfig {
    pub invite_ttl_days: u32,
    pub min_password_length: u32,
    pub busy_timeout_ms: u64,
    pub strict_integrity: bool,
}

impl From<LedgerConfig> for FfiLedgerConfig {
    fn from(config: LedgerConfig) -> Self {
        Self {
            invite_ttl_days: config.invite_ttl_days,
            min_password_length: config.min_password_length as u32,
            busy_timeout_ms: config.busy_timeout_ms,
            strict_integrity: config.strict_integrity,
        }
    }
}

impl From<FfiLedgerConfig> for LedgerConfig {
    fn from(config: FfiLedgerConfig) -> Self {
        LedgerConfig {
            invite_ttl_days: config.invite_ttl_days,
            min_password_length: config.min_password_length as usize,
            busy_timeout_ms: config.busy_timeout_ms,
            strict_integrity: config.strict_integrity,
        }
    }
}

/// FFI-safe org membership.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMembership {
    pub org_id: String,
    pub role: String,
}

impl From<OrgMember> for FfiMembership {
    fn from(member: OrgMember) -> Self {
        Self {
            org_id: member.org_id,
            role: member.role.as_str().to_string(),
        }
    }
}

/// FFI-safe authenticated caller.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiActor {
    pub user_id: String,
    pub global_role: String,
    pub memberships: Vec<FfiMembership>,
}

impl TryFrom<FfiActor> for Actor {
    type Error = CarerxError;

    fn try_from(actor: FfiActor) -> Result<Self, Self::Error> {
        let memberships = actor
            .memberships
            .into_iter()
            .map(|m| {
                Ok(Membership {
                    role: parse_field("organization role", &m.role, OrgRole::parse)?,
                    org_id: m.org_id,
                })
            })
            .collect::<Result<Vec<_>, CarerxError>>()?;

        Ok(Actor {
            user_id: actor.user_id,
            global_role: parse_field("global role", &actor.global_role, GlobalRole::parse)?,
            memberships,
        })
    }
}

/// FFI-safe user.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUser {
    pub id: String,
    pub email: String,
    pub global_role: String,
    pub created_at: String,
}

impl From<User> for FfiUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            global_role: user.global_role.as_str().to_string(),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// FFI-safe organization.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiOrganization {
    pub id: String,
    pub name: String,
    pub org_type: String,
    pub domain: Option<String>,
}

impl From<Organization> for FfiOrganization {
    fn from(org: Organization) -> Self {
        Self {
            id: org.id,
            name: org.name,
            org_type: org.org_type.as_str().to_string(),
            domain: org.domain,
        }
    }
}

/// FFI-safe prescription line input.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewPrescriptionItem {
    pub medicine_id: String,
    pub dose: String,
    pub frequency: String,
    pub duration_days: u32,
    pub quantity: u32,
}

impl From<FfiNewPrescriptionItem> for NewPrescriptionItem {
    fn from(item: FfiNewPrescriptionItem) -> Self {
        NewPrescriptionItem {
            medicine_id: item.medicine_id,
            dose: item.dose,
            frequency: item.frequency,
            duration_days: item.duration_days,
            quantity: item.quantity,
        }
    }
}

/// FFI-safe prescription input.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNewPrescription {
    pub patient_id: String,
    pub notes: Option<String>,
    pub items: Vec<FfiNewPrescriptionItem>,
}

/// FFI-safe prescription item.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescriptionItem {
    pub id: String,
    pub prescription_id: String,
    pub medicine_id: String,
    pub dose: String,
    pub frequency: String,
    pub duration_days: u32,
    pub quantity: u32,
}

impl From<PrescriptionItem> for FfiPrescriptionItem {
    fn from(item: PrescriptionItem) -> Self {
        Self {
            id: item.id,
            prescription_id: item.prescription_id,
            medicine_id: item.medicine_id,
            dose: item.dose,
            frequency: item.frequency,
            duration_days: item.duration_days,
            quantity: item.quantity,
        }
    }
}

impl From<FfiPrescriptionItem> for PrescriptionItem {
    fn from(item: FfiPrescriptionItem) -> Self {
        PrescriptionItem {
            id: item.id,
            prescription_id: item.prescription_id,
            medicine_id: item.medicine_id,
            dose: item.dose,
            frequency: item.frequency,
            duration_days: item.duration_days,
            quantity: item.quantity,
        }
    }
}

/// FFI-safe prescription.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescription {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub status: String,
    pub notes: Option<String>,
    pub items: Vec<FfiPrescriptionItem>,
    pub created_at: String,
}

impl From<Prescription> for FfiPrescription {
    fn from(rx: Prescription) -> Self {
        Self {
            id: rx.id,
            patient_id: rx.patient_id,
            doctor_id: rx.doctor_id,
            status: rx.status.as_str().to_string(),
            notes: rx.notes,
            items: rx.items.into_iter().map(Into::into).collect(),
            created_at: rx.created_at.to_rfc3339(),
        }
    }
}

/// FFI-safe remaining quantity for one item.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRemainingItem {
    pub prescription_item_id: String,
    pub prescribed_quantity: u32,
    pub dispensed_quantity: u64,
    pub remaining_quantity: u32,
    pub excess_quantity: u64,
}

impl From<RemainingItem> for FfiRemainingItem {
    fn from(item: RemainingItem) -> Self {
        Self {
            prescription_item_id: item.prescription_item_id,
            prescribed_quantity: item.prescribed_quantity,
            dispensed_quantity: item.dispensed_quantity,
            remaining_quantity: item.remaining_quantity,
            excess_quantity: item.excess_quantity,
        }
    }
}

/// FFI-safe verify result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiVerification {
    pub prescription: FfiPrescription,
    pub remaining: Vec<FfiRemainingItem>,
    pub is_fully_dispensed: bool,
}

impl From<Verification> for FfiVerification {
    fn from(verification: Verification) -> Self {
        Self {
            is_fully_dispensed: verification.is_fully_dispensed(),
            prescription: verification.prescription.into(),
            remaining: verification.remaining.into_iter().map(Into::into).collect(),
        }
    }
}

/// FFI-safe requested line.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiRequestedItem {
    pub prescription_item_id: String,
    pub quantity: u32,
}

/// FFI-safe dispense request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDispenseRequest {
    pub items: Vec<FfiRequestedItem>,
    pub notes: Option<String>,
    pub pharmacy_org_id: Option<String>,
}

impl From<FfiDispenseRequest> for DispenseRequest {
    fn from(request: FfiDispenseRequest) -> Self {
        DispenseRequest {
            items: request
                .items
                .into_iter()
                .map(|item| RequestedItem::new(item.prescription_item_id, item.quantity))
                .collect(),
            notes: request.notes,
            pharmacy_org_id: request.pharmacy_org_id,
        }
    }
}

/// FFI-safe dispensed line.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDispenseItem {
    pub id: String,
    pub dispense_record_id: String,
    pub prescription_item_id: String,
    pub quantity: u32,
}

impl From<DispenseItem> for FfiDispenseItem {
    fn from(item: DispenseItem) -> Self {
        Self {
            id: item.id,
            dispense_record_id: item.dispense_record_id,
            prescription_item_id: item.prescription_item_id,
            quantity: item.quantity,
        }
    }
}

impl From<FfiDispenseItem> for DispenseItem {
    fn from(item: FfiDispenseItem) -> Self {
        DispenseItem {
            id: item.id,
            dispense_record_id: item.dispense_record_id,
            prescription_item_id: item.prescription_item_id,
            quantity: item.quantity,
        }
    }
}

/// FFI-safe dispense record.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiDispenseRecord {
    pub id: String,
    pub prescription_id: String,
    pub dispensed_by_id: String,
    pub pharmacy_org_id: String,
    pub status: String,
    pub notes: Option<String>,
    pub items: Vec<FfiDispenseItem>,
    pub created_at: String,
}

impl From<DispenseRecord> for FfiDispenseRecord {
    fn from(record: DispenseRecord) -> Self {
        Self {
            id: record.id,
            prescription_id: record.prescription_id,
            dispensed_by_id: record.dispensed_by_id,
            pharmacy_org_id: record.pharmacy_org_id,
            status: record.status.as_str().to_string(),
            notes: record.notes,
            items: record.items.into_iter().map(Into::into).collect(),
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

/// FFI-safe issued invite. `token` is shown once and never stored.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiIssuedInvite {
    pub invite_id: String,
    pub email: String,
    pub kind: String,
    pub subject_id: String,
    pub role: Option<String>,
    pub expires_at: String,
    pub token: String,
}

impl From<IssuedInvite> for FfiIssuedInvite {
    fn from(issued: IssuedInvite) -> Self {
        let Invite {
            id,
            email,
            target,
            expires_at,
            ..
        } = issued.invite;
        let role = match &target {
            models::InviteTarget::Organization { role, .. } => Some(role.as_str().to_string()),
            models::InviteTarget::Guardian { .. } => None,
        };

        Self {
            invite_id: id,
            email,
            kind: target.kind().to_string(),
            subject_id: target.subject_id().to_string(),
            role,
            expires_at: expires_at.to_rfc3339(),
            token: issued.token,
        }
    }
}

/// FFI-safe invite acceptance result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrincipal {
    pub user_id: String,
    pub email: String,
    pub global_role: String,
    pub created: bool,
}

impl From<Principal> for FfiPrincipal {
    fn from(principal: Principal) -> Self {
        Self {
            user_id: principal.user_id,
            email: principal.email,
            global_role: principal.global_role.as_str().to_string(),
            created: principal.created,
        }
    }
}

/// FFI-safe audit event. `metadata` is a JSON object string.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAuditEvent {
    pub id: String,
    pub action: String,
    pub actor_user_id: Option<String>,
    pub target_type: String,
    pub target_id: Option<String>,
    pub org_id: Option<String>,
    pub metadata: String,
    pub created_at: String,
}

impl From<AuditEvent> for FfiAuditEvent {
    fn from(event: AuditEvent) -> Self {
        Self {
            id: event.id,
            action: event.action,
            actor_user_id: event.actor_user_id,
            target_type: event.target_type,
            target_id: event.target_id,
            org_id: event.org_id,
            metadata: event.metadata.to_string(),
            created_at: event.created_at.to_rfc3339(),
        }
    }
}
