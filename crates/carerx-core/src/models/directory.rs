//! Users, organizations, memberships and guardian links.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform-wide role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GlobalRole {
    /// Top administrative role
    RootAdmin,
    User,
}

impl GlobalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalRole::RootAdmin => "ROOT_ADMIN",
            GlobalRole::User => "USER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ROOT_ADMIN" => Some(GlobalRole::RootAdmin),
            "USER" => Some(GlobalRole::User),
            _ => None,
        }
    }
}

/// Role of a user inside one organization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrgRole {
    Admin,
    Doctor,
    Pharmacist,
    LabTech,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Admin => "ADMIN",
            OrgRole::Doctor => "DOCTOR",
            OrgRole::Pharmacist => "PHARMACIST",
            OrgRole::LabTech => "LAB_TECH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ADMIN" => Some(OrgRole::Admin),
            "DOCTOR" => Some(OrgRole::Doctor),
            "PHARMACIST" => Some(OrgRole::Pharmacist),
            "LAB_TECH" => Some(OrgRole::LabTech),
            _ => None,
        }
    }
}

/// Kind of organization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrgType {
    Hospital,
    Clinic,
    Pharmacy,
    Lab,
}

impl OrgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgType::Hospital => "HOSPITAL",
            OrgType::Clinic => "CLINIC",
            OrgType::Pharmacy => "PHARMACY",
            OrgType::Lab => "LAB",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HOSPITAL" => Some(OrgType::Hospital),
            "CLINIC" => Some(OrgType::Clinic),
            "PHARMACY" => Some(OrgType::Pharmacy),
            "LAB" => Some(OrgType::Lab),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardianStatus {
    Active,
    Revoked,
}

impl GuardianStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardianStatus::Active => "ACTIVE",
            GuardianStatus::Revoked => "REVOKED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(GuardianStatus::Active),
            "REVOKED" => Some(GuardianStatus::Revoked),
            _ => None,
        }
    }
}

/// A registered user (password hash stays in the store).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    /// Stored lowercase
    pub email: String,
    pub global_role: GlobalRole,
    pub created_at: DateTime<Utc>,
}

/// An organization (hospital, pharmacy, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub org_type: OrgType,
    /// Email domain allow-list for invites, e.g. "cityhospital.lk"
    pub domain: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: String, org_type: OrgType, domain: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            org_type,
            domain: domain.map(|d| d.trim().to_lowercase()),
            created_at: Utc::now(),
        }
    }
}

/// Persisted membership row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrgMember {
    pub user_id: String,
    pub org_id: String,
    pub role: OrgRole,
    pub created_at: DateTime<Utc>,
}

/// Guardian delegation from a patient to another user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuardianLink {
    pub patient_id: String,
    pub guardian_id: String,
    pub status: GuardianStatus,
    pub created_at: DateTime<Utc>,
}

impl GuardianLink {
    pub fn is_active(&self) -> bool {
        self.status == GuardianStatus::Active
    }
}

/// Membership as carried in an authenticated actor context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Membership {
    pub org_id: String,
    pub role: OrgRole,
}

/// Authenticated caller, already verified by the identity layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Actor {
    pub user_id: String,
    pub global_role: GlobalRole,
    pub memberships: Vec<Membership>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, global_role: GlobalRole) -> Self {
        Self {
            user_id: user_id.into(),
            global_role,
            memberships: Vec::new(),
        }
    }

    /// Builder-style helper to attach a membership.
    pub fn with_membership(mut self, org_id: impl Into<String>, role: OrgRole) -> Self {
        self.memberships.push(Membership {
            org_id: org_id.into(),
            role,
        });
        self
    }

    pub fn is_root_admin(&self) -> bool {
        self.global_role == GlobalRole::RootAdmin
    }

    /// Org IDs where the actor holds `role`.
    pub fn orgs_with_role(&self, role: OrgRole) -> impl Iterator<Item = &str> + '_ {
        self.memberships
            .iter()
            .filter(move |m| m.role == role)
            .map(|m| m.org_id.as_str())
    }

    pub fn has_role(&self, role: OrgRole) -> bool {
        self.orgs_with_role(role).next().is_some()
    }
}

/// The invitee after a successful invite acceptance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Principal {
    pub user_id: String,
    pub email: String,
    pub global_role: GlobalRole,
    /// True when the acceptance created the account
    pub created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_roles() {
        let actor = Actor::new("user-1", GlobalRole::User)
            .with_membership("org-a", OrgRole::Doctor)
            .with_membership("org-b", OrgRole::Pharmacist);

        assert!(!actor.is_root_admin());
        assert!(actor.has_role(OrgRole::Pharmacist));
        assert!(!actor.has_role(OrgRole::LabTech));
        assert_eq!(
            actor.orgs_with_role(OrgRole::Pharmacist).collect::<Vec<_>>(),
            vec!["org-b"]
        );
    }

    #[test]
    fn test_organization_domain_normalized() {
        let org = Organization::new("City".into(), OrgType::Pharmacy, Some(" City.LK ".into()));
        assert_eq!(org.domain.as_deref(), Some("city.lk"));
    }

    #[test]
    fn test_role_strings() {
        assert_eq!(OrgRole::parse(OrgRole::LabTech.as_str()), Some(OrgRole::LabTech));
        assert_eq!(OrgType::parse("PHARMACY"), Some(OrgType::Pharmacy));
        assert_eq!(GlobalRole::parse("root_admin"), None);
        assert_eq!(GuardianStatus::parse("REVOKED"), Some(GuardianStatus::Revoked));
    }
}
