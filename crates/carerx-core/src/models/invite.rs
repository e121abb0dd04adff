//! Invite models shared by guardian and organization invites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::directory::OrgRole;

/// Invite status. Leaves `Pending` at most once and never returns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Expired,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "PENDING",
            InviteStatus::Accepted => "ACCEPTED",
            InviteStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(InviteStatus::Pending),
            "ACCEPTED" => Some(InviteStatus::Accepted),
            "EXPIRED" => Some(InviteStatus::Expired),
            _ => None,
        }
    }
}

/// What accepting the invite grants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InviteTarget {
    /// Become guardian of a patient
    Guardian { patient_id: String },
    /// Join an organization with a role
    Organization { org_id: String, role: OrgRole },
}

impl InviteTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            InviteTarget::Guardian { .. } => "guardian",
            InviteTarget::Organization { .. } => "organization",
        }
    }

    /// ID of the patient or organization the invite points at.
    pub fn subject_id(&self) -> &str {
        match self {
            InviteTarget::Guardian { patient_id } => patient_id,
            InviteTarget::Organization { org_id, .. } => org_id,
        }
    }
}

/// A stored invite. The raw token is never stored, only its hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invite {
    pub id: String,
    pub token_hash: String,
    /// Stored lowercase
    pub email: String,
    pub target: InviteTarget,
    pub status: InviteStatus,
    pub invited_by: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Invite {
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Result of creating an invite: the raw token is handed out exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedInvite {
    pub invite: Invite,
    pub token: String,
}
