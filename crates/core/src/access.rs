//! Role-based access control.
//!
//! Every core operation receives an explicit [`RequestContext`]. Authorisation is a lookup in
//! a fixed capability table from ([`Role`], [`Operation`]) to a [`Scope`]; scoped rules
//! (assignment, ownership) are then checked against the concrete resource.

use crate::{RecordError, RecordResult};
use chs_uuid::ShardableUuid;
use fhir::{EncounterData, PatientData};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account role. Fixed at registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    /// Clinician.
    Doctor,
    /// Community health worker.
    Chw,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Chw => "chw",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "doctor" => Some(Role::Doctor),
            "chw" => Some(Role::Chw),
            _ => None,
        }
    }

    /// Human-readable title, used as the `Author-Role` commit trailer.
    pub const fn title(self) -> &'static str {
        match self {
            Role::Admin => "Administrator",
            Role::Doctor => "Doctor",
            Role::Chw => "Community Health Worker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    CreatePatient,
    ReadPatient,
    ModifyPatient,
    CreateEncounter,
    ReadEncounter,
    ManageEvents,
    ListEvents,
    RecordAttendance,
    InitiatePayment,
    ViewPayments,
    ManageAccounts,
    ViewAuditTrail,
}

/// How far a granted operation reaches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Every resource.
    Any,
    /// Only patients (and their encounters) assigned to the actor.
    Assigned,
    /// Only resources the actor organises, pays or receives.
    Own,
    Denied,
}

/// The capability table.
pub const fn scope_for(role: Role, op: Operation) -> Scope {
    use Operation::*;
    match (role, op) {
        (Role::Admin, _) => Scope::Any,

        (Role::Doctor, ManageAccounts | ViewAuditTrail) => Scope::Denied,
        (Role::Doctor, ManageEvents | InitiatePayment | ViewPayments) => Scope::Own,
        (Role::Doctor, _) => Scope::Any,

        (Role::Chw, ManageAccounts | ViewAuditTrail) => Scope::Denied,
        (Role::Chw, ReadPatient | ModifyPatient | CreateEncounter | ReadEncounter) => {
            Scope::Assigned
        }
        (Role::Chw, ManageEvents | ListEvents | InitiatePayment | ViewPayments) => Scope::Own,
        (Role::Chw, CreatePatient | RecordAttendance) => Scope::Any,
    }
}

/// The authenticated account performing an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: ShardableUuid,
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub facility_name: Option<String>,
    pub license_number: Option<String>,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Resolve the scope for `op`, failing if the role is denied outright.
    pub fn authorize(&self, op: Operation) -> RecordResult<Scope> {
        match scope_for(self.role, op) {
            Scope::Denied => Err(RecordError::AccessDenied),
            scope => Ok(scope),
        }
    }

    pub fn can_access_patient(&self, op: Operation, patient: &PatientData) -> bool {
        match scope_for(self.role, op) {
            Scope::Any => true,
            Scope::Assigned => patient.assigned_chw.as_ref() == Some(&self.id),
            Scope::Own | Scope::Denied => false,
        }
    }

    pub fn ensure_patient_access(&self, op: Operation, patient: &PatientData) -> RecordResult<()> {
        if self.can_access_patient(op, patient) {
            Ok(())
        } else {
            Err(RecordError::AccessDenied)
        }
    }

    /// Encounter reads are allowed to the assigned worker or the encounter's provider.
    pub fn can_read_encounter(&self, patient: &PatientData, encounter: &EncounterData) -> bool {
        self.can_access_patient(Operation::ReadEncounter, patient)
            || (scope_for(self.role, Operation::ReadEncounter) == Scope::Assigned
                && encounter.provider_id == self.id)
    }

    /// Ownership check for scoped `Own` operations.
    pub fn owns(&self, op: Operation, owners: &[Option<&ShardableUuid>]) -> bool {
        match scope_for(self.role, op) {
            Scope::Any => true,
            Scope::Own => owners.iter().flatten().any(|id| **id == self.id),
            Scope::Assigned | Scope::Denied => false,
        }
    }
}

/// Where a request came from, recorded in audit entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestOrigin {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Explicit per-request context: who is acting and from where.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub actor: Option<Actor>,
    pub origin: RequestOrigin,
}

impl RequestContext {
    pub fn anonymous(origin: RequestOrigin) -> Self {
        Self {
            actor: None,
            origin,
        }
    }

    pub fn for_actor(actor: Actor, origin: RequestOrigin) -> Self {
        Self {
            actor: Some(actor),
            origin,
        }
    }

    /// The acting account, or [`RecordError::Unauthenticated`].
    pub fn actor(&self) -> RecordResult<&Actor> {
        self.actor.as_ref().ok_or(RecordError::Unauthenticated)
    }

    pub fn actor_id(&self) -> Option<&ShardableUuid> {
        self.actor.as_ref().map(|a| &a.id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use fhir::{EmergencyContact, Gender, PatientAddress, PatientStatus};

    pub(crate) fn actor(role: Role) -> Actor {
        Actor {
            id: ShardableUuid::new(),
            username: format!("{}_user", role.as_str()),
            full_name: "Test User".into(),
            email: "user@example.com".into(),
            role,
            facility_name: Some("Kibera Health Centre".into()),
            license_number: None,
        }
    }

    fn patient(assigned: Option<ShardableUuid>) -> PatientData {
        PatientData {
            id: ShardableUuid::new(),
            patient_number: "CHS20260301ABCDEF12".into(),
            national_id: None,
            nhif_number: None,
            first_name: "Amina".into(),
            last_name: "Otieno".into(),
            birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            gender: Gender::Female,
            phone: None,
            email: None,
            address: PatientAddress::default(),
            blood_group: None,
            allergies: None,
            chronic_conditions: None,
            emergency_contact: EmergencyContact::default(),
            assigned_chw: assigned,
            status: PatientStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn admin_has_any_scope_everywhere() {
        for op in [
            Operation::ManageAccounts,
            Operation::ViewAuditTrail,
            Operation::ReadPatient,
            Operation::ViewPayments,
        ] {
            assert_eq!(scope_for(Role::Admin, op), Scope::Any);
        }
    }

    #[test]
    fn non_admins_cannot_manage_accounts_or_read_audit() {
        for role in [Role::Doctor, Role::Chw] {
            let a = actor(role);
            assert!(matches!(
                a.authorize(Operation::ManageAccounts),
                Err(RecordError::AccessDenied)
            ));
            assert!(matches!(
                a.authorize(Operation::ViewAuditTrail),
                Err(RecordError::AccessDenied)
            ));
        }
    }

    #[test]
    fn chw_reaches_only_assigned_patients() {
        let chw = actor(Role::Chw);
        let mine = patient(Some(chw.id.clone()));
        let theirs = patient(Some(ShardableUuid::new()));
        let unassigned = patient(None);

        assert!(chw.can_access_patient(Operation::ReadPatient, &mine));
        assert!(chw.can_access_patient(Operation::ModifyPatient, &mine));
        assert!(!chw.can_access_patient(Operation::ReadPatient, &theirs));
        assert!(!chw.can_access_patient(Operation::ModifyPatient, &theirs));
        assert!(!chw.can_access_patient(Operation::ReadPatient, &unassigned));
        assert!(chw
            .ensure_patient_access(Operation::CreateEncounter, &theirs)
            .is_err());
    }

    #[test]
    fn clinician_reaches_every_patient() {
        let doctor = actor(Role::Doctor);
        let theirs = patient(Some(ShardableUuid::new()));
        assert!(doctor.can_access_patient(Operation::ReadPatient, &theirs));
        assert!(doctor.can_access_patient(Operation::CreateEncounter, &theirs));
    }

    #[test]
    fn own_scope_matches_any_listed_owner() {
        let chw = actor(Role::Chw);
        let other = ShardableUuid::new();
        assert!(chw.owns(Operation::ViewPayments, &[Some(&other), Some(&chw.id)]));
        assert!(!chw.owns(Operation::ViewPayments, &[Some(&other), None]));
        assert!(actor(Role::Admin).owns(Operation::ViewPayments, &[None]));
    }

    #[test]
    fn anonymous_context_has_no_actor() {
        let ctx = RequestContext::anonymous(RequestOrigin::default());
        assert!(matches!(ctx.actor(), Err(RecordError::Unauthenticated)));
        assert!(ctx.actor_id().is_none());
    }
}
