//! Access predicates over an authenticated [`Actor`].
//!
//! Predicates answer yes/no (or which pharmacy); a missing grant is never an
//! error. Only a failing directory lookup is. Callers turn a `false`/`None`
//! into `Forbidden`.

use tracing::{debug, warn};

use crate::db::{DbResult, Store};
use crate::error::CoreResult;
use crate::models::{Actor, GuardianLink, OrgRole, OrgType, Organization};

/// Lookups the predicates need from the user/organization directory.
pub trait Directory {
    fn organization(&self, org_id: &str) -> DbResult<Option<Organization>>;

    fn guardian_link(&self, patient_id: &str, guardian_id: &str) -> DbResult<Option<GuardianLink>>;
}

impl Directory for Store<'_> {
    fn organization(&self, org_id: &str) -> DbResult<Option<Organization>> {
        self.get_organization(org_id)
    }

    fn guardian_link(&self, patient_id: &str, guardian_id: &str) -> DbResult<Option<GuardianLink>> {
        self.get_guardian_link(patient_id, guardian_id)
    }
}

/// Clinical data families an org role may read without being the patient
/// or a guardian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClinicalGrant {
    LabResults,
    Dispenses,
    Prescriptions,
}

/// Evaluates access predicates against a [`Directory`].
pub struct AccessEvaluator<'d, D: Directory + ?Sized> {
    directory: &'d D,
}

impl<'d, D: Directory + ?Sized> AccessEvaluator<'d, D> {
    pub fn new(directory: &'d D) -> Self {
        Self { directory }
    }

    /// ROOT_ADMIN, the patient themself, or an ACTIVE guardian of the patient.
    pub fn can_access_patient_record(&self, actor: &Actor, patient_id: &str) -> CoreResult<bool> {
        if actor.is_root_admin() || actor.user_id == patient_id {
            return Ok(true);
        }

        let is_guardian = self
            .directory
            .guardian_link(patient_id, &actor.user_id)?
            .is_some_and(|link| link.is_active());

        if !is_guardian {
            warn!(
                actor = %actor.user_id,
                patient = %patient_id,
                "Patient record access denied"
            );
        }
        Ok(is_guardian)
    }

    /// [`Self::can_access_patient_record`], widened by the org role that
    /// `grant` names.
    pub fn can_read_patient_record(
        &self,
        actor: &Actor,
        patient_id: &str,
        grant: ClinicalGrant,
    ) -> CoreResult<bool> {
        if actor.is_root_admin() || actor.user_id == patient_id {
            return Ok(true);
        }

        let granted = match grant {
            ClinicalGrant::LabResults => actor.has_role(OrgRole::LabTech),
            ClinicalGrant::Prescriptions => actor.has_role(OrgRole::Doctor),
            ClinicalGrant::Dispenses => !self.pharmacy_orgs(actor)?.is_empty(),
        };
        if granted {
            debug!(actor = %actor.user_id, ?grant, "Read granted by org role");
            return Ok(true);
        }

        self.can_access_patient_record(actor, patient_id)
    }

    /// The pharmacy the actor dispenses on behalf of.
    ///
    /// Without `preferred`, the first pharmacy by org ID. With it, that org
    /// if the actor is a pharmacist there.
    pub fn can_dispense(&self, actor: &Actor, preferred: Option<&str>) -> CoreResult<Option<String>> {
        let orgs = self.pharmacy_orgs(actor)?;

        let org = match preferred {
            Some(wanted) => orgs.into_iter().find(|org_id| org_id == wanted),
            None => orgs.into_iter().next(),
        };

        if org.is_none() {
            warn!(
                actor = %actor.user_id,
                preferred = ?preferred,
                "Actor is not a pharmacist at a pharmacy"
            );
        }
        Ok(org)
    }

    /// ROOT_ADMIN or anyone who may dispense.
    pub fn can_verify(&self, actor: &Actor) -> CoreResult<bool> {
        if actor.is_root_admin() {
            return Ok(true);
        }
        Ok(self.can_dispense(actor, None)?.is_some())
    }

    /// Org IDs, sorted, where the actor is a PHARMACIST and the org is a PHARMACY.
    fn pharmacy_orgs(&self, actor: &Actor) -> CoreResult<Vec<String>> {
        let mut candidates: Vec<&str> = actor.orgs_with_role(OrgRole::Pharmacist).collect();
        candidates.sort_unstable();
        candidates.dedup();

        let mut orgs = Vec::new();
        for org_id in candidates {
            let is_pharmacy = self
                .directory
                .organization(org_id)?
                .is_some_and(|org| org.org_type == OrgType::Pharmacy);
            if is_pharmacy {
                orgs.push(org_id.to_string());
            }
        }
        Ok(orgs)
    }
}
