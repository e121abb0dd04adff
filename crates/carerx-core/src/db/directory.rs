//! Users, organizations, memberships and guardian links.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{parse_enum, DbError, DbResult, Store};
use crate::models::{
    GlobalRole, GuardianLink, GuardianStatus, OrgMember, OrgRole, OrgType, Organization, User,
};

impl Store<'_> {
    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a user. The email is stored lowercase.
    pub fn insert_user(&self, user: &User, password_hash: &str) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO users (id, email, password_hash, global_role, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                user.id,
                user.email.to_lowercase(),
                password_hash,
                user.global_role.as_str(),
                user.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> DbResult<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, email, global_role, created_at FROM users WHERE id = ?",
                [id],
                UserRow::from_row,
            )
            .optional()?
            .map(UserRow::into_user)
            .transpose()
    }

    /// Find a user by email, case-insensitively.
    pub fn find_user_by_email(&self, email: &str) -> DbResult<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, email, global_role, created_at FROM users WHERE email = ?",
                [email.to_lowercase()],
                UserRow::from_row,
            )
            .optional()?
            .map(UserRow::into_user)
            .transpose()
    }

    pub fn get_password_hash(&self, user_id: &str) -> DbResult<Option<String>> {
        self.conn
            .query_row(
                "SELECT password_hash FROM users WHERE id = ?",
                [user_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    // =========================================================================
    // Organizations
    // =========================================================================

    pub fn insert_organization(&self, org: &Organization) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO organizations (id, name, org_type, domain, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                org.id,
                org.name,
                org.org_type.as_str(),
                org.domain,
                org.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_organization(&self, id: &str) -> DbResult<Option<Organization>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, org_type, domain, created_at FROM organizations WHERE id = ?",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, DateTime<Utc>>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, name, org_type, domain, created_at)| {
            Ok(Organization {
                org_type: parse_enum("org type", &org_type, OrgType::parse)?,
                id,
                name,
                domain,
                created_at,
            })
        })
        .transpose()
    }

    // =========================================================================
    // Memberships
    // =========================================================================

    /// Insert a membership unless the user already belongs to the org.
    ///
    /// Returns true when a row was written.
    pub fn insert_org_member(&self, member: &OrgMember) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO org_members (user_id, org_id, role, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                member.user_id,
                member.org_id,
                member.role.as_str(),
                member.created_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn get_org_member(&self, user_id: &str, org_id: &str) -> DbResult<Option<OrgMember>> {
        self.conn
            .query_row(
                r#"
                SELECT user_id, org_id, role, created_at
                FROM org_members
                WHERE user_id = ? AND org_id = ?
                "#,
                [user_id, org_id],
                MemberRow::from_row,
            )
            .optional()?
            .map(MemberRow::into_member)
            .transpose()
    }

    /// Memberships of a user, by org ID.
    pub fn list_memberships(&self, user_id: &str) -> DbResult<Vec<OrgMember>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT user_id, org_id, role, created_at
            FROM org_members
            WHERE user_id = ?
            ORDER BY org_id
            "#,
        )?;
        let rows = stmt.query_map([user_id], MemberRow::from_row)?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?.into_member()?);
        }
        Ok(members)
    }

    pub fn count_org_members(&self, org_id: &str) -> DbResult<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM org_members WHERE org_id = ?",
            [org_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // =========================================================================
    // Guardian Links
    // =========================================================================

    pub fn get_guardian_link(
        &self,
        patient_id: &str,
        guardian_id: &str,
    ) -> DbResult<Option<GuardianLink>> {
        self.conn
            .query_row(
                r#"
                SELECT patient_id, guardian_id, status, created_at
                FROM guardian_links
                WHERE patient_id = ? AND guardian_id = ?
                "#,
                [patient_id, guardian_id],
                GuardianLinkRow::from_row,
            )
            .optional()?
            .map(GuardianLinkRow::into_link)
            .transpose()
    }

    /// Insert an ACTIVE link unless one already exists for the pair.
    ///
    /// Returns true when a row was written.
    pub fn insert_guardian_link(&self, patient_id: &str, guardian_id: &str) -> DbResult<bool> {
        if patient_id == guardian_id {
            return Err(DbError::Constraint("guardian cannot be the patient".into()));
        }
        let rows_affected = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO guardian_links (patient_id, guardian_id, status, created_at)
            VALUES (?1, ?2, 'ACTIVE', ?3)
            "#,
            params![patient_id, guardian_id, Utc::now()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Set the status of an existing link. Returns false if the link is missing
    /// or already has that status.
    pub fn set_guardian_link_status(
        &self,
        patient_id: &str,
        guardian_id: &str,
        status: GuardianStatus,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE guardian_links SET status = ?3
            WHERE patient_id = ?1 AND guardian_id = ?2 AND status != ?3
            "#,
            params![patient_id, guardian_id, status.as_str()],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn list_guardian_links(&self, patient_id: &str) -> DbResult<Vec<GuardianLink>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT patient_id, guardian_id, status, created_at
            FROM guardian_links
            WHERE patient_id = ?
            ORDER BY created_at
            "#,
        )?;
        let rows = stmt.query_map([patient_id], GuardianLinkRow::from_row)?;

        let mut links = Vec::new();
        for row in rows {
            links.push(row?.into_link()?);
        }
        Ok(links)
    }
}

struct UserRow {
    id: String,
    email: String,
    global_role: String,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            global_role: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn into_user(self) -> DbResult<User> {
        Ok(User {
            global_role: parse_enum("global role", &self.global_role, GlobalRole::parse)?,
            id: self.id,
            email: self.email,
            created_at: self.created_at,
        })
    }
}

struct MemberRow {
    user_id: String,
    org_id: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl MemberRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            org_id: row.get(1)?,
            role: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn into_member(self) -> DbResult<OrgMember> {
        Ok(OrgMember {
            role: parse_enum("org role", &self.role, OrgRole::parse)?,
            user_id: self.user_id,
            org_id: self.org_id,
            created_at: self.created_at,
        })
    }
}

struct GuardianLinkRow {
    patient_id: String,
    guardian_id: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl GuardianLinkRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            patient_id: row.get(0)?,
            guardian_id: row.get(1)?,
            status: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn into_link(self) -> DbResult<GuardianLink> {
        Ok(GuardianLink {
            status: parse_enum("guardian status", &self.status, GuardianStatus::parse)?,
            patient_id: self.patient_id,
            guardian_id: self.guardian_id,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn user(email: &str) -> User {
        User {
            id: uuid::Uuid::new_v4().to_string(),
            email: email.into(),
            global_role: GlobalRole::User,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_user_email_lookup_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        let store = db.store();
        let u = user("Nimal@Example.com");
        store.insert_user(&u, "hash").unwrap();

        let found = store.find_user_by_email("NIMAL@example.COM").unwrap().unwrap();
        assert_eq!(found.id, u.id);
        assert_eq!(found.email, "nimal@example.com");
        assert_eq!(store.get_password_hash(&u.id).unwrap().as_deref(), Some("hash"));
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let db = Database::open_in_memory().unwrap();
        let store = db.store();
        store.insert_user(&user("a@example.com"), "h").unwrap();
        assert!(store.insert_user(&user("A@example.com"), "h").is_err());
    }

    #[test]
    fn test_membership_insert_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let store = db.store();
        let u = user("pharm@example.com");
        store.insert_user(&u, "h").unwrap();
        let org = Organization::new("Osusala".into(), OrgType::Pharmacy, None);
        store.insert_organization(&org).unwrap();

        let member = OrgMember {
            user_id: u.id.clone(),
            org_id: org.id.clone(),
            role: OrgRole::Pharmacist,
            created_at: Utc::now(),
        };
        assert!(store.insert_org_member(&member).unwrap());
        assert!(!store.insert_org_member(&member).unwrap());
        assert_eq!(store.count_org_members(&org.id).unwrap(), 1);

        let loaded = store.get_org_member(&u.id, &org.id).unwrap().unwrap();
        assert_eq!(loaded.role, OrgRole::Pharmacist);
        assert_eq!(store.list_memberships(&u.id).unwrap().len(), 1);
        assert_eq!(
            store.get_organization(&org.id).unwrap().unwrap().org_type,
            OrgType::Pharmacy
        );
    }

    #[test]
    fn test_guardian_link_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let store = db.store();
        let patient = user("patient@example.com");
        let guardian = user("guardian@example.com");
        store.insert_user(&patient, "h").unwrap();
        store.insert_user(&guardian, "h").unwrap();

        assert!(store.insert_guardian_link(&patient.id, &guardian.id).unwrap());
        assert!(!store.insert_guardian_link(&patient.id, &guardian.id).unwrap());
        assert!(store
            .get_guardian_link(&patient.id, &guardian.id)
            .unwrap()
            .unwrap()
            .is_active());

        assert!(store
            .set_guardian_link_status(&patient.id, &guardian.id, GuardianStatus::Revoked)
            .unwrap());
        assert!(!store
            .set_guardian_link_status(&patient.id, &guardian.id, GuardianStatus::Revoked)
            .unwrap());
        assert_eq!(store.list_guardian_links(&patient.id).unwrap().len(), 1);
    }

    #[test]
    fn test_self_guardianship_rejected() {
        let db = Database::open_in_memory().unwrap();
        let store = db.store();
        let patient = user("patient@example.com");
        store.insert_user(&patient, "h").unwrap();
        assert!(store.insert_guardian_link(&patient.id, &patient.id).is_err());
    }
}
