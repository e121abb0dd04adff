//! Shared fixtures for integration tests.

#![allow(dead_code)]

use carerx_core::db::Database;
use carerx_core::error::CoreResult;
use carerx_core::invites::PasswordHasher;
use carerx_core::ledger::{DispenseRequest, RequestedItem};
use carerx_core::models::{
    Actor, GlobalRole, NewPrescription, NewPrescriptionItem, OrgRole, OrgType, Organization,
    Prescription, User,
};

/// Cheap hasher so tests skip the Argon2 cost.
pub struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, password: &str) -> CoreResult<String> {
        Ok(format!("plain${}", password))
    }
}

pub fn seed_pharmacy(db: &Database) -> String {
    let org = Organization::new("Osusala Colombo".into(), OrgType::Pharmacy, None);
    db.store().insert_organization(&org).unwrap();
    org.id
}

pub fn seed_user(db: &Database, id: &str, email: &str) -> User {
    let user = User {
        id: id.into(),
        email: email.into(),
        global_role: GlobalRole::User,
        created_at: chrono::Utc::now(),
    };
    db.store().insert_user(&user, "plain$seed").unwrap();
    user
}

pub fn pharmacist(org_id: &str) -> Actor {
    Actor::new("pharmacist-1", GlobalRole::User).with_membership(org_id, OrgRole::Pharmacist)
}

pub fn root_admin() -> Actor {
    Actor::new("root", GlobalRole::RootAdmin)
}

/// Insert an ACTIVE prescription with one item per quantity.
pub fn prescribe(db: &mut Database, quantities: &[u32]) -> Prescription {
    let rx = NewPrescription {
        patient_id: "patient-1".into(),
        doctor_id: "doctor-1".into(),
        notes: Some("Take after meals".into()),
        items: quantities
            .iter()
            .enumerate()
            .map(|(i, &quantity)| NewPrescriptionItem {
                medicine_id: format!("med-{}", i),
                dose: "1 tablet".into(),
                frequency: "2x daily".into(),
                duration_days: 5,
                quantity,
            })
            .collect(),
    }
    .into_prescription()
    .unwrap();
    db.insert_prescription(&rx).unwrap();
    rx
}

/// Request `(item index, quantity)` pairs against `rx`.
pub fn request(rx: &Prescription, lines: &[(usize, u32)]) -> DispenseRequest {
    DispenseRequest::new(
        lines
            .iter()
            .map(|&(index, quantity)| RequestedItem::new(rx.items[index].id.clone(), quantity))
            .collect(),
    )
}
