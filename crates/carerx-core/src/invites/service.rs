//! Guardian and organization invite lifecycle.
//!
//! Both invite kinds share one state machine: PENDING → ACCEPTED or
//! PENDING → EXPIRED, each at most once. Expiry is applied lazily when a
//! stale invite is presented.

use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{info, warn};

use super::email::EmailAddress;
use super::password::PasswordHasher;
use super::token::{generate_token, hash_token};
use crate::audit::{self, AuditEvent, AuditSink};
use crate::config::LedgerConfig;
use crate::db::{Database, Store};
use crate::error::{CoreError, CoreResult};
use crate::models::{
    Actor, GlobalRole, GuardianStatus, Invite, InviteStatus, InviteTarget, IssuedInvite,
    OrgMember, OrgRole, Principal, User,
};

/// Issues and redeems invites.
pub struct InviteService<'a> {
    db: &'a mut Database,
    hasher: &'a dyn PasswordHasher,
    audit: &'a dyn AuditSink,
    config: &'a LedgerConfig,
}

impl<'a> InviteService<'a> {
    pub fn new(
        db: &'a mut Database,
        hasher: &'a dyn PasswordHasher,
        audit: &'a dyn AuditSink,
        config: &'a LedgerConfig,
    ) -> Self {
        Self {
            db,
            hasher,
            audit,
            config,
        }
    }

    // =========================================================================
    // Issue
    // =========================================================================

    /// Invite `email` to become a guardian of `patient_id`.
    pub fn create_guardian_invite(
        &mut self,
        actor: &Actor,
        patient_id: &str,
        email: &str,
    ) -> CoreResult<IssuedInvite> {
        if !actor.is_root_admin() && actor.user_id != patient_id {
            return Err(CoreError::Forbidden(
                "only the patient can invite a guardian".into(),
            ));
        }

        let tx = self.db.write_transaction()?;
        let store = Store::new(&tx);

        let patient = store
            .get_user(patient_id)?
            .ok_or_else(|| CoreError::not_found("Patient", patient_id))?;
        let email = EmailAddress::parse(email)?;
        if email.as_str() == patient.email.to_lowercase() {
            return Err(CoreError::InvalidInput(
                "a patient cannot be their own guardian".into(),
            ));
        }

        if let Some(existing) = store.find_user_by_email(email.as_str())? {
            let already_guardian = store
                .get_guardian_link(&patient.id, &existing.id)?
                .is_some_and(|link| link.is_active());
            if already_guardian {
                return Err(CoreError::duplicate(format!(
                    "{} is already a guardian of this patient",
                    email
                )));
            }
        }

        let target = InviteTarget::Guardian {
            patient_id: patient.id.clone(),
        };
        let issued = issue(store, actor, &email, target, self.config)?;
        tx.commit()?;

        self.announce(actor, &issued.invite);
        Ok(issued)
    }

    /// Invite `email` to join `org_id` with `role`. ROOT_ADMIN only.
    pub fn create_org_invite(
        &mut self,
        actor: &Actor,
        org_id: &str,
        email: &str,
        role: OrgRole,
    ) -> CoreResult<IssuedInvite> {
        if !actor.is_root_admin() {
            return Err(CoreError::Forbidden(
                "only administrators can invite organization members".into(),
            ));
        }

        let tx = self.db.write_transaction()?;
        let store = Store::new(&tx);

        let org = store
            .get_organization(org_id)?
            .ok_or_else(|| CoreError::not_found("Organization", org_id))?;
        let email = EmailAddress::parse(email)?;
        if let Some(domain) = org.domain.as_deref() {
            if !email.domain().eq_ignore_ascii_case(domain) {
                return Err(CoreError::InvalidInput(format!(
                    "email must belong to the {} domain",
                    domain
                )));
            }
        }

        let target = InviteTarget::Organization {
            org_id: org.id.clone(),
            role,
        };
        let issued = issue(store, actor, &email, target, self.config)?;
        tx.commit()?;

        self.announce(actor, &issued.invite);
        Ok(issued)
    }

    fn announce(&self, actor: &Actor, invite: &Invite) {
        info!(
            invite = %invite.id,
            kind = invite.target.kind(),
            subject = %invite.target.subject_id(),
            expires_at = %invite.expires_at,
            "Invite issued"
        );
        audit::emit(
            self.audit,
            AuditEvent::new("invite.create", "invite", Some(invite.id.clone()))
                .actor(&actor.user_id)
                .metadata(json!({
                    "kind": invite.target.kind(),
                    "subjectId": invite.target.subject_id(),
                    "email": invite.email,
                })),
        );
    }

    // =========================================================================
    // Redeem
    // =========================================================================

    /// Redeem a raw invite token.
    ///
    /// Creates the account if the invited email has none, then grants the
    /// guardian link or membership. An invite found past its expiry is
    /// marked EXPIRED (committed) before `Expired` is returned.
    pub fn accept_invite(&mut self, token: &str, password: &str) -> CoreResult<Principal> {
        let token_hash = hash_token(token);

        let tx = self.db.write_transaction()?;
        let store = Store::new(&tx);

        let invite = store
            .find_invite_by_token_hash(&token_hash)?
            .ok_or_else(|| CoreError::not_found("Invite", "token"))?;

        match invite.status {
            InviteStatus::Accepted => {
                return Err(CoreError::InvalidState("invite already accepted".into()))
            }
            InviteStatus::Expired => return Err(CoreError::Expired),
            InviteStatus::Pending => {}
        }

        let now = Utc::now();
        if invite.is_past_expiry(now) {
            store.transition_invite(&invite.id, InviteStatus::Expired)?;
            tx.commit()?;
            warn!(invite = %invite.id, expires_at = %invite.expires_at, "Invite expired");
            return Err(CoreError::Expired);
        }

        let (user, created) = match store.find_user_by_email(&invite.email)? {
            Some(user) => (user, false),
            None => {
                if password.chars().count() < self.config.min_password_length {
                    return Err(CoreError::InvalidInput(format!(
                        "password must be at least {} characters",
                        self.config.min_password_length
                    )));
                }
                let user = User {
                    id: uuid::Uuid::new_v4().to_string(),
                    email: invite.email.clone(),
                    global_role: GlobalRole::User,
                    created_at: now,
                };
                store.insert_user(&user, &self.hasher.hash(password)?)?;
                (user, true)
            }
        };

        match &invite.target {
            InviteTarget::Guardian { patient_id } => {
                if &user.id == patient_id {
                    return Err(CoreError::InvalidInput(
                        "a patient cannot be their own guardian".into(),
                    ));
                }
                match store.get_guardian_link(patient_id, &user.id)? {
                    None => {
                        store.insert_guardian_link(patient_id, &user.id)?;
                    }
                    Some(link) if !link.is_active() => {
                        store.set_guardian_link_status(patient_id, &user.id, GuardianStatus::Active)?;
                    }
                    Some(_) => {}
                }
            }
            InviteTarget::Organization { org_id, role } => {
                store.insert_org_member(&OrgMember {
                    user_id: user.id.clone(),
                    org_id: org_id.clone(),
                    role: *role,
                    created_at: now,
                })?;
            }
        }

        if !store.transition_invite(&invite.id, InviteStatus::Accepted)? {
            return Err(CoreError::InvalidState("invite already used".into()));
        }
        tx.commit()?;

        info!(
            invite = %invite.id,
            user = %user.id,
            created,
            kind = invite.target.kind(),
            "Invite accepted"
        );
        audit::emit(
            self.audit,
            AuditEvent::new("invite.accept", "invite", Some(invite.id.clone()))
                .actor(&user.id)
                .metadata(json!({
                    "kind": invite.target.kind(),
                    "subjectId": invite.target.subject_id(),
                    "createdUser": created,
                })),
        );

        Ok(Principal {
            user_id: user.id,
            email: user.email,
            global_role: user.global_role,
            created,
        })
    }

    // =========================================================================
    // Revoke
    // =========================================================================

    /// Revoke a guardian's access to a patient. Revoking twice is a no-op.
    pub fn revoke_guardian(&mut self, actor: &Actor, patient_id: &str, guardian_id: &str) -> CoreResult<()> {
        if !actor.is_root_admin() && actor.user_id != patient_id {
            return Err(CoreError::Forbidden(
                "only the patient can revoke a guardian".into(),
            ));
        }

        let tx = self.db.write_transaction()?;
        let store = Store::new(&tx);

        if store.get_guardian_link(patient_id, guardian_id)?.is_none() {
            return Err(CoreError::not_found(
                "Guardian link",
                format!("{}/{}", patient_id, guardian_id),
            ));
        }
        let revoked = store.set_guardian_link_status(patient_id, guardian_id, GuardianStatus::Revoked)?;
        tx.commit()?;

        if revoked {
            info!(patient = %patient_id, guardian = %guardian_id, "Guardian revoked");
            audit::emit(
                self.audit,
                AuditEvent::new("guardian.revoke", "guardian_link", Some(guardian_id.to_string()))
                    .actor(&actor.user_id)
                    .metadata(json!({ "patientId": patient_id })),
            );
        }
        Ok(())
    }
}

/// Insert a fresh PENDING invite unless a live one already exists.
fn issue(
    store: Store<'_>,
    actor: &Actor,
    email: &EmailAddress,
    target: InviteTarget,
    config: &LedgerConfig,
) -> CoreResult<IssuedInvite> {
    let now = Utc::now();
    if store
        .find_live_pending_invite(email.as_str(), &target, now)?
        .is_some()
    {
        return Err(CoreError::duplicate(format!(
            "a pending invite for {} already exists",
            email
        )));
    }

    let token = generate_token();
    let invite = Invite {
        id: uuid::Uuid::new_v4().to_string(),
        token_hash: hash_token(&token),
        email: email.to_string(),
        target,
        status: InviteStatus::Pending,
        invited_by: actor.user_id.clone(),
        expires_at: now + Duration::days(i64::from(config.invite_ttl_days)),
        created_at: now,
    };
    store.insert_invite(&invite)?;

    Ok(IssuedInvite { invite, token })
}
