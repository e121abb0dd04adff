//! Invite database operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{parse_enum, DbError, DbResult, Store};
use crate::models::{Invite, InviteStatus, InviteTarget, OrgRole};

const INVITE_COLUMNS: &str = r#"
    id, token_hash, email, kind, patient_id, org_id, role,
    status, invited_by, expires_at, created_at
"#;

impl Store<'_> {
    pub fn insert_invite(&self, invite: &Invite) -> DbResult<()> {
        let (patient_id, org_id, role) = match &invite.target {
            InviteTarget::Guardian { patient_id } => (Some(patient_id.as_str()), None, None),
            InviteTarget::Organization { org_id, role } => {
                (None, Some(org_id.as_str()), Some(role.as_str()))
            }
        };

        self.conn.execute(
            r#"
            INSERT INTO invites (
                id, token_hash, email, kind, patient_id, org_id, role,
                status, invited_by, expires_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                invite.id,
                invite.token_hash,
                invite.email.to_lowercase(),
                invite.target.kind(),
                patient_id,
                org_id,
                role,
                invite.status.as_str(),
                invite.invited_by,
                invite.expires_at,
                invite.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_invite(&self, id: &str) -> DbResult<Option<Invite>> {
        let sql = format!("SELECT {} FROM invites WHERE id = ?", INVITE_COLUMNS);
        self.conn
            .query_row(&sql, [id], InviteRow::from_row)
            .optional()?
            .map(InviteRow::into_invite)
            .transpose()
    }

    pub fn find_invite_by_token_hash(&self, token_hash: &str) -> DbResult<Option<Invite>> {
        let sql = format!("SELECT {} FROM invites WHERE token_hash = ?", INVITE_COLUMNS);
        self.conn
            .query_row(&sql, [token_hash], InviteRow::from_row)
            .optional()?
            .map(InviteRow::into_invite)
            .transpose()
    }

    /// A PENDING invite for the same email and target that has not expired yet.
    pub fn find_live_pending_invite(
        &self,
        email: &str,
        target: &InviteTarget,
        now: DateTime<Utc>,
    ) -> DbResult<Option<Invite>> {
        let sql = format!(
            r#"
            SELECT {} FROM invites
            WHERE email = ?1 AND kind = ?2 AND COALESCE(patient_id, org_id) = ?3
              AND status = 'PENDING'
            ORDER BY created_at DESC
            "#,
            INVITE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![email.to_lowercase(), target.kind(), target.subject_id()],
            InviteRow::from_row,
        )?;

        for row in rows {
            let invite = row?.into_invite()?;
            if !invite.is_past_expiry(now) {
                return Ok(Some(invite));
            }
        }
        Ok(None)
    }

    /// Move a PENDING invite to `status`.
    ///
    /// Returns false when the invite is no longer PENDING.
    pub fn transition_invite(&self, id: &str, status: InviteStatus) -> DbResult<bool> {
        if status == InviteStatus::Pending {
            return Err(DbError::Constraint("invites never return to PENDING".into()));
        }
        let rows_affected = self.conn.execute(
            "UPDATE invites SET status = ?2 WHERE id = ?1 AND status = 'PENDING'",
            params![id, status.as_str()],
        )?;
        Ok(rows_affected > 0)
    }
}

/// Internal row type for invite queries.
struct InviteRow {
    id: String,
    token_hash: String,
    email: String,
    kind: String,
    patient_id: Option<String>,
    org_id: Option<String>,
    role: Option<String>,
    status: String,
    invited_by: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl InviteRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            token_hash: row.get(1)?,
            email: row.get(2)?,
            kind: row.get(3)?,
            patient_id: row.get(4)?,
            org_id: row.get(5)?,
            role: row.get(6)?,
            status: row.get(7)?,
            invited_by: row.get(8)?,
            expires_at: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    fn into_invite(self) -> DbResult<Invite> {
        let target = match (self.kind.as_str(), self.patient_id, self.org_id, self.role) {
            ("guardian", Some(patient_id), None, None) => InviteTarget::Guardian { patient_id },
            ("organization", None, Some(org_id), Some(role)) => InviteTarget::Organization {
                org_id,
                role: parse_enum("org role", &role, OrgRole::parse)?,
            },
            (kind, ..) => {
                return Err(DbError::Constraint(format!(
                    "invite {} has inconsistent '{}' target",
                    self.id, kind
                )))
            }
        };

        Ok(Invite {
            status: parse_enum("invite status", &self.status, InviteStatus::parse)?,
            id: self.id,
            token_hash: self.token_hash,
            email: self.email,
            target,
            invited_by: self.invited_by,
            expires_at: self.expires_at,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{GlobalRole, OrgType, Organization, User};
    use chrono::Duration;

    fn setup() -> (Database, String, String) {
        let db = Database::open_in_memory().unwrap();
        let patient = User {
            id: "patient-1".into(),
            email: "patient@example.com".into(),
            global_role: GlobalRole::User,
            created_at: Utc::now(),
        };
        db.store().insert_user(&patient, "h").unwrap();
        let org = Organization::new("Osusala".into(), OrgType::Pharmacy, None);
        db.store().insert_organization(&org).unwrap();
        (db, patient.id, org.id)
    }

    fn invite(target: InviteTarget, hash: &str, expires_in: Duration) -> Invite {
        let now = Utc::now();
        Invite {
            id: uuid::Uuid::new_v4().to_string(),
            token_hash: hash.into(),
            email: "Guardian@Example.com".into(),
            target,
            status: InviteStatus::Pending,
            invited_by: "root".into(),
            expires_at: now + expires_in,
            created_at: now,
        }
    }

    #[test]
    fn test_insert_and_find_by_token_hash() {
        let (db, patient_id, org_id) = setup();
        let store = db.store();

        let guardian = invite(
            InviteTarget::Guardian {
                patient_id: patient_id.clone(),
            },
            "hash-g",
            Duration::days(7),
        );
        let org = invite(
            InviteTarget::Organization {
                org_id: org_id.clone(),
                role: OrgRole::Pharmacist,
            },
            "hash-o",
            Duration::days(7),
        );
        store.insert_invite(&guardian).unwrap();
        store.insert_invite(&org).unwrap();

        let loaded = store.find_invite_by_token_hash("hash-g").unwrap().unwrap();
        assert_eq!(loaded.target, guardian.target);
        assert_eq!(loaded.email, "guardian@example.com");

        let loaded = store.find_invite_by_token_hash("hash-o").unwrap().unwrap();
        assert_eq!(loaded.target, org.target);
        assert!(store.find_invite_by_token_hash("missing").unwrap().is_none());
    }

    #[test]
    fn test_live_pending_ignores_expired() {
        let (db, patient_id, _) = setup();
        let store = db.store();
        let target = InviteTarget::Guardian { patient_id };

        store
            .insert_invite(&invite(target.clone(), "old", -Duration::hours(1)))
            .unwrap();
        assert!(store
            .find_live_pending_invite("guardian@example.com", &target, Utc::now())
            .unwrap()
            .is_none());

        store
            .insert_invite(&invite(target.clone(), "new", Duration::days(7)))
            .unwrap();
        assert!(store
            .find_live_pending_invite("GUARDIAN@example.com", &target, Utc::now())
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_transition_only_from_pending() {
        let (db, patient_id, _) = setup();
        let store = db.store();
        let inv = invite(InviteTarget::Guardian { patient_id }, "h", Duration::days(7));
        store.insert_invite(&inv).unwrap();

        assert!(store.transition_invite(&inv.id, InviteStatus::Accepted).unwrap());
        assert!(!store.transition_invite(&inv.id, InviteStatus::Expired).unwrap());
        assert!(store.transition_invite(&inv.id, InviteStatus::Pending).is_err());
        assert_eq!(
            store.get_invite(&inv.id).unwrap().unwrap().status,
            InviteStatus::Accepted
        );
    }
}
