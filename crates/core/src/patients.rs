//! Patient records and clinical encounters.
//!
//! Each patient is a git repository under `patients/`:
//!
//! ```text
//! patients/
//!   <s1>/
//!     <s2>/
//!       <uuid>/
//!         patient.yaml          # FHIR-aligned Patient resource
//!         encounters/
//!           <timestamp-id>.yaml # one file per visit, append-only
//!         .git/
//! ```
//!
//! Every create and update is a commit authored by the acting account. Access is checked
//! against the capability table in [`crate::access`]: community health workers only reach
//! patients assigned to them.

use crate::access::{Actor, Operation, RequestContext, Role, Scope};
use crate::audit::{AuditAction, AuditResource, AuditService};
use crate::author::Author;
use crate::clinical::{bmi_category, calculate_bmi};
use crate::config::{CoreConfig, IndexKind};
use crate::constants::{
    DEFAULT_CARE_LOCATION, ENCOUNTERS_DIR_NAME, PATIENT_FILENAME, RECENT_ENCOUNTERS,
    RECENT_PAYMENTS, REFERENCE_PREFIX, SEARCH_LIMIT, SEARCH_MIN_QUERY_LEN,
};
use crate::payments::{Payment, PaymentService};
use crate::store::{claim_reference, list_sharded, UniqueIndex};
use crate::validation::{FieldErrors, BLOOD_GROUPS, NOT_A_CHOICE};
use crate::versioned_files::{
    CommitAction, CommitDomain, CommitMessage, FileToWrite, VersionedFileService,
};
use crate::{RecordError, RecordResult};
use api_shared::{EncounterReq, EncounterRes, PatientDetailRes, PatientReq, PatientRes, PatientSearchHit};
use chrono::{NaiveDate, Utc};
use chs_uuid::{ShardableUuid, TimestampUuid};
use fhir::{
    EmergencyContact, Encounter, EncounterData, EncounterType, Gender, Patient, PatientAddress,
    PatientData, PatientStatus, VitalSigns,
};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ============================================================================
// TYPE-STATE MARKERS
// ============================================================================

/// Marker type: the patient record does not exist yet. Only `create()` is available.
#[derive(Clone, Copy, Debug)]
pub struct Uninitialised;

/// Marker type: the service is bound to an existing patient.
#[derive(Clone, Debug)]
pub struct Initialised {
    patient_id: ShardableUuid,
}

/// Service for patient records and their encounters.
///
/// Generic parameter `S` is either [`Uninitialised`] or [`Initialised`]. Listing and search
/// are available in both states.
#[derive(Clone, Debug)]
pub struct PatientService<S> {
    cfg: Arc<CoreConfig>,
    state: S,
}

/// Patient with its recent encounters and payments.
#[derive(Clone, Debug)]
pub struct PatientDetail {
    pub patient: PatientData,
    pub encounters: Vec<EncounterData>,
    pub payments: Vec<Payment>,
}

impl PatientDetail {
    pub fn into_res(self) -> PatientDetailRes {
        PatientDetailRes {
            patient: patient_res(&self.patient),
            encounters: self.encounters.iter().map(encounter_res).collect(),
            payments: self.payments.iter().map(Into::into).collect(),
        }
    }
}

/// Editable patient fields after validation.
struct PatientFields {
    first_name: String,
    last_name: String,
    birth_date: NaiveDate,
    gender: Gender,
    national_id: Option<String>,
    nhif_number: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    address: PatientAddress,
    blood_group: Option<String>,
    allergies: Option<String>,
    chronic_conditions: Option<String>,
    emergency_contact: EmergencyContact,
    status: Option<PatientStatus>,
}

impl PatientFields {
    fn validate(req: &PatientReq, today: NaiveDate) -> RecordResult<Self> {
        let mut errors = FieldErrors::default();

        let first_name = errors.required("first_name", &req.first_name, 100);
        let last_name = errors.required("last_name", &req.last_name, 100);
        let birth_date = errors.date("date_of_birth", &req.date_of_birth);
        if birth_date.is_some_and(|d| d > today) {
            errors.add("date_of_birth", "Date of birth cannot be in the future.");
        }
        let gender = errors.choice("gender", &req.gender, Gender::from_wire);

        let national_id = errors.optional("national_id", req.national_id.as_deref(), 20);
        let nhif_number = errors.optional("nhif_number", req.nhif_number.as_deref(), 20);
        let phone = errors.optional("phone", req.phone.as_deref(), 20);
        let email = errors
            .optional_email("email", req.email.as_deref())
            .map(|e| e.as_str().to_string());

        let address = PatientAddress {
            county: errors.optional("county", req.county.as_deref(), 100),
            subcounty: errors.optional("subcounty", req.subcounty.as_deref(), 100),
            ward: errors.optional("ward", req.ward.as_deref(), 100),
            village: errors.optional("village", req.village.as_deref(), 100),
            line: FieldErrors::free_text(req.address.as_deref()),
        };

        let blood_group = FieldErrors::free_text(req.blood_group.as_deref());
        if let Some(bg) = blood_group.as_deref() {
            if !BLOOD_GROUPS.contains(&bg) {
                errors.add("blood_group", NOT_A_CHOICE);
            }
        }

        let emergency_contact = EmergencyContact {
            name: errors.optional(
                "emergency_contact_name",
                req.emergency_contact_name.as_deref(),
                200,
            ),
            phone: errors.optional(
                "emergency_contact_phone",
                req.emergency_contact_phone.as_deref(),
                20,
            ),
        };

        let status = match FieldErrors::free_text(req.status.as_deref()) {
            Some(s) => errors.choice("status", &s, PatientStatus::from_name),
            None => None,
        };

        let (Some(first_name), Some(last_name), Some(birth_date), Some(gender)) =
            (first_name, last_name, birth_date, gender)
        else {
            return Err(errors.into());
        };
        errors.finish()?;

        Ok(Self {
            first_name: first_name.into_inner(),
            last_name: last_name.into_inner(),
            birth_date,
            gender,
            national_id,
            nhif_number,
            phone,
            email,
            address,
            blood_group,
            allergies: FieldErrors::free_text(req.allergies.as_deref()),
            chronic_conditions: FieldErrors::free_text(req.chronic_conditions.as_deref()),
            emergency_contact,
            status,
        })
    }

    fn apply(self, patient: &mut PatientData) {
        patient.first_name = self.first_name;
        patient.last_name = self.last_name;
        patient.birth_date = self.birth_date;
        patient.gender = self.gender;
        patient.national_id = self.national_id;
        patient.nhif_number = self.nhif_number;
        patient.phone = self.phone;
        patient.email = self.email;
        patient.address = self.address;
        patient.blood_group = self.blood_group;
        patient.allergies = self.allergies;
        patient.chronic_conditions = self.chronic_conditions;
        patient.emergency_contact = self.emergency_contact;
        if let Some(status) = self.status {
            patient.status = status;
        }
    }
}

fn care_location(actor: &Actor, facility: Option<&str>) -> String {
    facility
        .or(actor.facility_name.as_deref())
        .unwrap_or(DEFAULT_CARE_LOCATION)
        .to_string()
}

fn duplicate_national_id() -> RecordError {
    RecordError::Duplicate("A patient with this national ID already exists.".into())
}

impl PatientService<Uninitialised> {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            cfg,
            state: Uninitialised,
        }
    }

    /// Creates a patient record and its repository.
    ///
    /// **This method consumes `self`** and returns a service bound to the new patient.
    ///
    /// A community health worker creating a patient becomes its assigned worker. The patient
    /// number and national id are claimed before the repository is written and released
    /// again if the initial commit fails.
    ///
    /// # Errors
    ///
    /// - [`RecordError::Validation`] for invalid fields.
    /// - [`RecordError::Duplicate`] if the national id is already registered.
    /// - [`RecordError::CleanupAfterInitialiseFailed`] if a failed commit also leaves the
    ///   directory behind.
    pub fn create(
        self,
        ctx: &RequestContext,
        req: &PatientReq,
    ) -> RecordResult<PatientService<Initialised>> {
        let actor = ctx.actor()?;
        actor.authorize(Operation::CreatePatient)?;
        let now = Utc::now();
        let fields = PatientFields::validate(req, now.date_naive())?;
        let author = Author::from_actor(actor)?;

        let commit_message = CommitMessage::new(
            CommitDomain::Record,
            CommitAction::Create,
            "Patient record created",
            care_location(actor, None),
        )?;

        let patient_id = ShardableUuid::new();
        let owner = patient_id.to_string();

        let national_id = fields.national_id.clone();
        let national_ids = UniqueIndex::new(&self.cfg, IndexKind::NationalId);
        if let Some(nid) = national_id.as_deref() {
            if !national_ids.claim(nid, &owner)? {
                return Err(duplicate_national_id());
            }
        }
        let release_national_id = || {
            if let Some(nid) = national_id.as_deref() {
                national_ids.release_quietly(nid);
            }
        };

        let numbers = UniqueIndex::new(&self.cfg, IndexKind::PatientNumber);
        let patient_number =
            match claim_reference(&numbers, REFERENCE_PREFIX, &owner, "patient number") {
                Ok(n) => n,
                Err(e) => {
                    release_national_id();
                    return Err(e);
                }
            };

        let assigned_chw = (actor.role == Role::Chw).then(|| actor.id.clone());
        let mut patient = PatientData {
            id: patient_id.clone(),
            patient_number: patient_number.clone(),
            national_id: None,
            nhif_number: None,
            first_name: String::new(),
            last_name: String::new(),
            birth_date: now.date_naive(),
            gender: Gender::Other,
            phone: None,
            email: None,
            address: PatientAddress::default(),
            blood_group: None,
            allergies: None,
            chronic_conditions: None,
            emergency_contact: EmergencyContact::default(),
            assigned_chw,
            status: PatientStatus::Active,
            created_at: now,
            updated_at: now,
        };
        fields.apply(&mut patient);

        let written: RecordResult<()> = (|| {
            let raw = Patient::render(&patient)?;
            let files = [FileToWrite {
                relative_path: Path::new(PATIENT_FILENAME),
                content: &raw,
                old_content: None,
            }];
            let patient_dir = patient_id.sharded_dir(&self.cfg.patients_dir());
            VersionedFileService::init_and_commit(&patient_dir, &author, &commit_message, &files)
        })();
        if let Err(e) = written {
            numbers.release_quietly(&patient_number);
            release_national_id();
            return Err(e);
        }

        tracing::info!("created patient {} ({})", patient.patient_number, patient.id);
        AuditService::new(self.cfg.clone()).record(
            ctx,
            AuditAction::PatientCreated,
            Some(AuditResource::new("patient", &patient.id)),
            format!("New patient created: {}", patient.full_name()),
        );

        Ok(PatientService {
            cfg: self.cfg,
            state: Initialised { patient_id },
        })
    }
}

impl PatientService<Initialised> {
    /// Binds the service to an existing patient id. Existence is checked on first access.
    pub fn with_id(cfg: Arc<CoreConfig>, patient_id: &str) -> RecordResult<Self> {
        let patient_id = ShardableUuid::parse(patient_id)?;
        Ok(Self {
            cfg,
            state: Initialised { patient_id },
        })
    }

    pub fn patient_id(&self) -> &ShardableUuid {
        &self.state.patient_id
    }

    fn patient_dir(&self) -> PathBuf {
        self.state.patient_id.sharded_dir(&self.cfg.patients_dir())
    }

    /// Reads `patient.yaml` without an access check. Returns the raw text alongside for
    /// rollback on update.
    fn load_raw(&self) -> RecordResult<(PatientData, String)> {
        let path = self.patient_dir().join(PATIENT_FILENAME);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RecordError::NotFound("patient"))
            }
            Err(e) => return Err(RecordError::FileRead(e)),
        };
        Ok((Patient::parse(&raw)?, raw))
    }

    pub(crate) fn load(&self) -> RecordResult<PatientData> {
        self.load_raw().map(|(patient, _)| patient)
    }

    /// Loads the patient, checking `op` against the acting account.
    pub fn read(&self, ctx: &RequestContext, op: Operation) -> RecordResult<PatientData> {
        let actor = ctx.actor()?;
        actor.authorize(op)?;
        let patient = self.load()?;
        actor.ensure_patient_access(op, &patient)?;
        Ok(patient)
    }

    /// All encounters, newest encounter date first. Unparsable files are skipped.
    pub(crate) fn encounters(&self) -> RecordResult<Vec<EncounterData>> {
        let dir = self.patient_dir().join(ENCOUNTERS_DIR_NAME);
        let entries = match fs::read_dir(&dir) {
            Ok(it) => it,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(RecordError::FileRead(e)),
        };

        let mut encounters = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(RecordError::FileRead)
                .and_then(|raw| Encounter::parse(&raw).map_err(RecordError::from));
            match parsed {
                Ok(encounter) => encounters.push(encounter),
                Err(e) => tracing::warn!("failed to parse {}: {}", path.display(), e),
            }
        }
        encounters.sort_by(|a, b| {
            b.encounter_date
                .cmp(&a.encounter_date)
                .then_with(|| b.id.timestamp().cmp(&a.id.timestamp()))
        });
        Ok(encounters)
    }

    /// Access-checked detail view: the patient, its most recent encounters visible to the
    /// actor, and the most recent payments linked to it.
    pub fn detail(&self, ctx: &RequestContext) -> RecordResult<PatientDetail> {
        let patient = self.read(ctx, Operation::ReadPatient)?;
        let actor = ctx.actor()?;

        let encounters = self
            .encounters()?
            .into_iter()
            .filter(|e| actor.can_read_encounter(&patient, e))
            .take(RECENT_ENCOUNTERS)
            .collect();
        let payments = PaymentService::new(self.cfg.clone())
            .recent_for_patient(&patient.id, RECENT_PAYMENTS);

        Ok(PatientDetail {
            patient,
            encounters,
            payments,
        })
    }

    /// Replaces the editable fields and commits the new `patient.yaml`.
    ///
    /// The patient number, assigned worker and creation time are never changed here. A
    /// changed national id is claimed before the write and the old one released after it.
    pub fn update(&self, ctx: &RequestContext, req: &PatientReq) -> RecordResult<PatientData> {
        let actor = ctx.actor()?;
        actor.authorize(Operation::ModifyPatient)?;
        let (mut patient, old_raw) = self.load_raw()?;
        actor.ensure_patient_access(Operation::ModifyPatient, &patient)?;

        let now = Utc::now();
        let fields = PatientFields::validate(req, now.date_naive())?;
        let author = Author::from_actor(actor)?;
        let commit_message = CommitMessage::new(
            CommitDomain::Record,
            CommitAction::Update,
            "Patient record updated",
            care_location(actor, None),
        )?;

        let old_national_id = patient.national_id.clone();
        fields.apply(&mut patient);
        patient.updated_at = now;

        let national_ids = UniqueIndex::new(&self.cfg, IndexKind::NationalId);
        let new_claim = match patient.national_id.as_deref() {
            Some(nid) if old_national_id.as_deref() != Some(nid) => {
                if !national_ids.claim(nid, &patient.id.to_string())? {
                    return Err(duplicate_national_id());
                }
                Some(nid.to_string())
            }
            _ => None,
        };

        let written: RecordResult<()> = (|| {
            let raw = Patient::render(&patient)?;
            let files = [FileToWrite {
                relative_path: Path::new(PATIENT_FILENAME),
                content: &raw,
                old_content: Some(&old_raw),
            }];
            VersionedFileService::write_and_commit_files(
                &self.patient_dir(),
                &author,
                &commit_message,
                &files,
            )
        })();
        if let Err(e) = written {
            if let Some(nid) = new_claim.as_deref() {
                national_ids.release_quietly(nid);
            }
            return Err(e);
        }

        if let Some(old) = old_national_id.as_deref() {
            if patient.national_id.as_deref() != Some(old) {
                national_ids.release_quietly(old);
            }
        }

        AuditService::new(self.cfg.clone()).record(
            ctx,
            AuditAction::PatientUpdated,
            Some(AuditResource::new("patient", &patient.id)),
            format!("Patient updated: {}", patient.full_name()),
        );
        Ok(patient)
    }

    /// Appends an encounter to the patient repository.
    ///
    /// The provider is the acting account; the facility defaults to the provider's.
    pub fn add_encounter(
        &self,
        ctx: &RequestContext,
        req: &EncounterReq,
    ) -> RecordResult<EncounterData> {
        let actor = ctx.actor()?;
        actor.authorize(Operation::CreateEncounter)?;
        let patient = self.load()?;
        actor.ensure_patient_access(Operation::CreateEncounter, &patient)?;

        let mut errors = FieldErrors::default();
        let encounter_type = errors.choice("encounter_type", &req.encounter_type, EncounterType::from_wire);
        let vitals = VitalSigns {
            weight_kg: errors.in_range("weight", req.weight, 0.0..=500.0),
            height_cm: errors.in_range("height", req.height, 0.0..=300.0),
            temperature_c: errors.in_range("temperature", req.temperature, 30.0..=50.0),
            systolic_bp: errors.in_range(
                "blood_pressure_systolic",
                req.blood_pressure_systolic,
                50..=300,
            ),
            diastolic_bp: errors.in_range(
                "blood_pressure_diastolic",
                req.blood_pressure_diastolic,
                30..=200,
            ),
            pulse_rate: errors.in_range("pulse_rate", req.pulse_rate, 30..=200),
        };
        let encounter_date = match FieldErrors::free_text(req.encounter_date.as_deref()) {
            Some(raw) => errors.datetime("encounter_date", &raw),
            None => Some(Utc::now()),
        };
        let follow_up_date = errors.optional_date("follow_up_date", req.follow_up_date.as_deref());
        let facility_name = errors
            .optional("facility_name", req.facility_name.as_deref(), 200)
            .or_else(|| actor.facility_name.clone());

        let (Some(encounter_type), Some(encounter_date)) = (encounter_type, encounter_date) else {
            return Err(errors.into());
        };
        errors.finish()?;

        let last_id = self
            .encounters()?
            .into_iter()
            .map(|e| e.id)
            .max_by_key(|id| id.timestamp());
        let encounter = EncounterData {
            id: TimestampUuid::generate(last_id.as_ref()),
            patient_id: patient.id.clone(),
            encounter_type,
            encounter_date,
            vitals,
            chief_complaint: FieldErrors::free_text(req.chief_complaint.as_deref()),
            diagnosis: FieldErrors::free_text(req.diagnosis.as_deref()),
            treatment_plan: FieldErrors::free_text(req.treatment_plan.as_deref()),
            medications_prescribed: FieldErrors::free_text(req.medications_prescribed.as_deref()),
            follow_up_date,
            provider_id: actor.id.clone(),
            facility_name,
            created_at: Utc::now(),
        };

        let author = Author::from_actor(actor)?;
        let commit_message = CommitMessage::new(
            CommitDomain::Encounter,
            CommitAction::Create,
            format!("{} recorded", encounter.encounter_type.as_str()),
            care_location(actor, encounter.facility_name.as_deref()),
        )?;
        let raw = Encounter::render(&encounter)?;
        let relative_path = Path::new(ENCOUNTERS_DIR_NAME).join(format!("{}.yaml", encounter.id));
        VersionedFileService::write_and_commit_files(
            &self.patient_dir(),
            &author,
            &commit_message,
            &[FileToWrite {
                relative_path: &relative_path,
                content: &raw,
                old_content: None,
            }],
        )?;

        AuditService::new(self.cfg.clone()).record(
            ctx,
            AuditAction::HealthRecordCreated,
            Some(AuditResource::new("health_record", &encounter.id)),
            format!("Health record created for patient: {}", patient.full_name()),
        );
        Ok(encounter)
    }
}

// ============================================================================
// SHARED OPERATIONS (AVAILABLE ON BOTH STATES)
// ============================================================================

impl<S> PatientService<S> {
    /// Every readable patient record. Unparsable records are logged and skipped.
    pub(crate) fn all(&self) -> Vec<PatientData> {
        list_sharded(&self.cfg.patients_dir(), PATIENT_FILENAME, |raw| {
            Patient::parse(raw).map_err(RecordError::from)
        })
    }

    /// Active patients visible to the actor. Community health workers see only their own.
    fn visible_active(&self, actor: &Actor) -> RecordResult<Vec<PatientData>> {
        let scope = actor.authorize(Operation::ReadPatient)?;
        Ok(self
            .all()
            .into_iter()
            .filter(|p| p.status == PatientStatus::Active)
            .filter(|p| scope != Scope::Assigned || p.assigned_chw.as_ref() == Some(&actor.id))
            .collect())
    }

    /// Active patients, newest first, optionally filtered by a case-insensitive substring of
    /// first name, last name, patient number or national id.
    pub fn list(&self, ctx: &RequestContext, search: Option<&str>) -> RecordResult<Vec<PatientData>> {
        let actor = ctx.actor()?;
        let term = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut patients: Vec<PatientData> = self
            .visible_active(actor)?
            .into_iter()
            .filter(|p| match term.as_deref() {
                None => true,
                Some(t) => {
                    p.first_name.to_lowercase().contains(t)
                        || p.last_name.to_lowercase().contains(t)
                        || p.patient_number.to_lowercase().contains(t)
                        || p.national_id
                            .as_deref()
                            .is_some_and(|n| n.to_lowercase().contains(t))
                }
            })
            .collect();
        patients.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(patients)
    }

    /// Quick search by name or patient number. Queries shorter than two characters match
    /// nothing.
    pub fn search(&self, ctx: &RequestContext, q: &str) -> RecordResult<Vec<PatientSearchHit>> {
        let actor = ctx.actor()?;
        let q = q.trim();
        if q.chars().count() < SEARCH_MIN_QUERY_LEN {
            return Ok(vec![]);
        }
        let needle = q.to_lowercase();
        let today = Utc::now().date_naive();

        let mut matches: Vec<PatientData> = self
            .visible_active(actor)?
            .into_iter()
            .filter(|p| {
                p.first_name.to_lowercase().contains(&needle)
                    || p.last_name.to_lowercase().contains(&needle)
                    || p.patient_number.to_lowercase().contains(&needle)
            })
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matches
            .into_iter()
            .take(SEARCH_LIMIT)
            .map(|p| PatientSearchHit {
                id: p.id.to_string(),
                name: p.full_name(),
                patient_number: p.patient_number.clone(),
                age: p.age_on(today),
            })
            .collect())
    }
}

pub fn patient_res(p: &PatientData) -> PatientRes {
    PatientRes {
        id: p.id.to_string(),
        patient_number: p.patient_number.clone(),
        national_id: p.national_id.clone(),
        nhif_number: p.nhif_number.clone(),
        first_name: p.first_name.clone(),
        last_name: p.last_name.clone(),
        full_name: p.full_name(),
        date_of_birth: p.birth_date.format("%Y-%m-%d").to_string(),
        age: p.age_on(Utc::now().date_naive()),
        gender: p.gender.as_str().to_string(),
        phone: p.phone.clone(),
        email: p.email.clone(),
        county: p.address.county.clone(),
        subcounty: p.address.subcounty.clone(),
        ward: p.address.ward.clone(),
        village: p.address.village.clone(),
        address: p.address.line.clone(),
        blood_group: p.blood_group.clone(),
        allergies: p.allergies.clone(),
        chronic_conditions: p.chronic_conditions.clone(),
        emergency_contact_name: p.emergency_contact.name.clone(),
        emergency_contact_phone: p.emergency_contact.phone.clone(),
        assigned_chw_id: p.assigned_chw.as_ref().map(ToString::to_string),
        status: p.status.as_str().to_string(),
        created_at: p.created_at.to_rfc3339(),
        updated_at: p.updated_at.to_rfc3339(),
    }
}

pub fn encounter_res(e: &EncounterData) -> EncounterRes {
    let bmi = calculate_bmi(&e.vitals);
    EncounterRes {
        id: e.id.to_string(),
        patient_id: e.patient_id.to_string(),
        encounter_type: e.encounter_type.as_str().to_string(),
        encounter_date: e.encounter_date.to_rfc3339(),
        weight: e.vitals.weight_kg,
        height: e.vitals.height_cm,
        bmi,
        bmi_category: bmi.map(|b| bmi_category(b).to_string()),
        temperature: e.vitals.temperature_c,
        blood_pressure_systolic: e.vitals.systolic_bp,
        blood_pressure_diastolic: e.vitals.diastolic_bp,
        pulse_rate: e.vitals.pulse_rate,
        chief_complaint: e.chief_complaint.clone(),
        diagnosis: e.diagnosis.clone(),
        treatment_plan: e.treatment_plan.clone(),
        medications_prescribed: e.medications_prescribed.clone(),
        follow_up_date: e.follow_up_date.map(|d| d.format("%Y-%m-%d").to_string()),
        provider_id: e.provider_id.to_string(),
        facility_name: e.facility_name.clone(),
        created_at: e.created_at.to_rfc3339(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::access::tests::actor;
    use crate::access::RequestOrigin;
    use crate::config::prepare_data_dir;
    use tempfile::TempDir;

    pub(crate) fn cfg(temp: &TempDir) -> Arc<CoreConfig> {
        let cfg = CoreConfig::new(temp.path().to_path_buf()).unwrap();
        prepare_data_dir(&cfg).unwrap();
        Arc::new(cfg)
    }

    pub(crate) fn ctx(role: Role) -> RequestContext {
        RequestContext::for_actor(actor(role), RequestOrigin::default())
    }

    pub(crate) fn patient_req(first: &str, last: &str) -> PatientReq {
        PatientReq {
            first_name: first.into(),
            last_name: last.into(),
            date_of_birth: "1990-04-12".into(),
            gender: "female".into(),
            county: Some("kisumu".into()),
            ..PatientReq::default()
        }
    }

    pub(crate) fn create(cfg: &Arc<CoreConfig>, ctx: &RequestContext, req: &PatientReq) -> PatientData {
        PatientService::new(cfg.clone())
            .create(ctx, req)
            .unwrap()
            .read(ctx, Operation::ReadPatient)
            .unwrap()
    }

    fn encounter_req(kind: &str) -> EncounterReq {
        EncounterReq {
            encounter_type: kind.into(),
            weight: Some(70.0),
            height: Some(175.0),
            ..EncounterReq::default()
        }
    }

    fn history(cfg: &Arc<CoreConfig>, id: &ShardableUuid) -> Vec<String> {
        VersionedFileService::open(&id.sharded_dir(&cfg.patients_dir()))
            .unwrap()
            .history_subjects()
            .unwrap()
    }

    #[test]
    fn create_generates_number_and_commits() {
        let temp = TempDir::new().unwrap();
        let cfg = cfg(&temp);
        let doctor = ctx(Role::Doctor);
        let patient = create(&cfg, &doctor, &patient_req("Amina", "Otieno"));

        assert!(patient.patient_number.starts_with("CHS"));
        assert_eq!(patient.patient_number.len(), 19);
        assert_eq!(patient.status, PatientStatus::Active);
        assert!(patient.assigned_chw.is_none());
        assert_eq!(
            history(&cfg, &patient.id),
            vec!["record:create: Patient record created".to_string()]
        );

        let entries = AuditService::new(cfg.clone()).recent(5).unwrap();
        assert_eq!(entries[0].action, AuditAction::PatientCreated);
        assert_eq!(entries[0].details, "New patient created: Amina Otieno");
    }

    #[test]
    fn chw_is_auto_assigned_and_isolated_from_other_workers() {
        let temp = TempDir::new().unwrap();
        let cfg = cfg(&temp);
        let chw_a = ctx(Role::Chw);
        let chw_b = ctx(Role::Chw);
        let patient = create(&cfg, &chw_a, &patient_req("Amina", "Otieno"));
        assert_eq!(patient.assigned_chw.as_ref(), chw_a.actor_id());

        let svc = PatientService::with_id(cfg.clone(), &patient.id.to_string()).unwrap();
        assert!(matches!(svc.detail(&chw_b), Err(RecordError::AccessDenied)));
        assert!(matches!(
            svc.update(&chw_b, &patient_req("Changed", "Name")),
            Err(RecordError::AccessDenied)
        ));
        assert!(matches!(
            svc.add_encounter(&chw_b, &encounter_req("screening")),
            Err(RecordError::AccessDenied)
        ));
        assert!(PatientService::new(cfg.clone()).list(&chw_b, None).unwrap().is_empty());

        // unchanged on disk
        assert_eq!(svc.load().unwrap().first_name, "Amina");
        assert_eq!(history(&cfg, &patient.id).len(), 1);
    }

    #[test]
    fn duplicate_national_id_is_rejected_and_freed_on_change() {
        let temp = TempDir::new().unwrap();
        let cfg = cfg(&temp);
        let admin = ctx(Role::Admin);
        let mut req = patient_req("Amina", "Otieno");
        req.national_id = Some("12345678".into());
        let first = create(&cfg, &admin, &req);

        let err = PatientService::new(cfg.clone())
            .create(&admin, &req)
            .unwrap_err();
        assert!(matches!(err, RecordError::Duplicate(_)));

        let svc = PatientService::with_id(cfg.clone(), &first.id.to_string()).unwrap();
        req.national_id = Some("87654321".into());
        svc.update(&admin, &req).unwrap();

        // the old id is free again
        let mut other = patient_req("Brian", "Mwangi");
        other.national_id = Some("12345678".into());
        create(&cfg, &admin, &other);
    }

    #[test]
    fn validation_collects_field_errors() {
        let temp = TempDir::new().unwrap();
        let cfg = cfg(&temp);
        let req = PatientReq {
            first_name: "".into(),
            last_name: "Otieno".into(),
            date_of_birth: "2999-01-01".into(),
            gender: "unknown".into(),
            blood_group: Some("C+".into()),
            ..PatientReq::default()
        };

        let RecordError::Validation(errors) = PatientService::new(cfg.clone())
            .create(&ctx(Role::Admin), &req)
            .unwrap_err()
        else {
            panic!("expected validation error");
        };
        assert!(errors.get("first_name").is_some());
        assert_eq!(
            errors.get("date_of_birth").unwrap(),
            ["Date of birth cannot be in the future."]
        );
        assert_eq!(errors.get("gender").unwrap(), [NOT_A_CHOICE]);
        assert_eq!(errors.get("blood_group").unwrap(), [NOT_A_CHOICE]);
        assert!(PatientService::new(cfg.clone()).all().is_empty());
    }

    #[test]
    fn update_keeps_identity_and_commits() {
        let temp = TempDir::new().unwrap();
        let cfg = cfg(&temp);
        let chw = ctx(Role::Chw);
        let patient = create(&cfg, &chw, &patient_req("Amina", "Otieno"));
        let svc = PatientService::with_id(cfg.clone(), &patient.id.to_string()).unwrap();

        let mut req = patient_req("Amina", "Achieng");
        req.status = Some("inactive".into());
        let updated = svc.update(&chw, &req).unwrap();

        assert_eq!(updated.last_name, "Achieng");
        assert_eq!(updated.status, PatientStatus::Inactive);
        assert_eq!(updated.patient_number, patient.patient_number);
        assert_eq!(updated.assigned_chw, patient.assigned_chw);
        assert_eq!(updated.created_at, patient.created_at);
        assert_eq!(
            history(&cfg, &patient.id)[0],
            "record:update: Patient record updated"
        );
    }

    #[test]
    fn encounters_are_committed_and_listed_with_bmi() {
        let temp = TempDir::new().unwrap();
        let cfg = cfg(&temp);
        let doctor = ctx(Role::Doctor);
        let patient = create(&cfg, &doctor, &patient_req("Amina", "Otieno"));
        let svc = PatientService::with_id(cfg.clone(), &patient.id.to_string()).unwrap();

        let first = svc.add_encounter(&doctor, &encounter_req("consultation")).unwrap();
        let second = svc.add_encounter(&doctor, &encounter_req("follow_up")).unwrap();
        assert!(second.id.timestamp() > first.id.timestamp());
        assert_eq!(first.provider_id, *doctor.actor_id().unwrap());
        assert_eq!(first.facility_name.as_deref(), Some("Kibera Health Centre"));

        let detail = svc.detail(&doctor).unwrap();
        assert_eq!(detail.encounters.len(), 2);
        let res = detail.into_res();
        assert_eq!(res.encounters[0].bmi, Some(22.9));
        assert_eq!(res.encounters[0].bmi_category.as_deref(), Some("Normal"));

        assert_eq!(
            history(&cfg, &patient.id)[0],
            "encounter:create: follow_up recorded"
        );
    }

    #[test]
    fn encounter_ranges_are_enforced() {
        let temp = TempDir::new().unwrap();
        let cfg = cfg(&temp);
        let doctor = ctx(Role::Doctor);
        let patient = create(&cfg, &doctor, &patient_req("Amina", "Otieno"));
        let svc = PatientService::with_id(cfg.clone(), &patient.id.to_string()).unwrap();

        let req = EncounterReq {
            encounter_type: "consultation".into(),
            temperature: Some(55.0),
            pulse_rate: Some(10),
            ..EncounterReq::default()
        };
        let RecordError::Validation(errors) = svc.add_encounter(&doctor, &req).unwrap_err() else {
            panic!("expected validation error");
        };
        assert_eq!(
            errors.get("temperature").unwrap(),
            ["Number must be between 30 and 50."]
        );
        assert!(errors.get("pulse_rate").is_some());
        assert!(svc.encounters().unwrap().is_empty());
    }

    #[test]
    fn list_and_search_filter_active_patients() {
        let temp = TempDir::new().unwrap();
        let cfg = cfg(&temp);
        let admin = ctx(Role::Admin);
        let amina = create(&cfg, &admin, &patient_req("Amina", "Otieno"));
        create(&cfg, &admin, &patient_req("Brian", "Mwangi"));
        let mut gone = patient_req("Amos", "Kiprop");
        gone.status = Some("deceased".into());
        create(&cfg, &admin, &gone);

        let svc = PatientService::new(cfg.clone());
        assert_eq!(svc.list(&admin, None).unwrap().len(), 2);
        let found = svc.list(&admin, Some("otie")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, amina.id);

        assert!(svc.search(&admin, "a").unwrap().is_empty());
        let hits = svc.search(&admin, "AM").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Amina Otieno");
        let by_number = svc.search(&admin, &amina.patient_number).unwrap();
        assert_eq!(by_number[0].id, amina.id.to_string());
    }

    #[test]
    fn unknown_patient_is_not_found() {
        let temp = TempDir::new().unwrap();
        let cfg = cfg(&temp);
        let svc = PatientService::with_id(cfg, &ShardableUuid::new().to_string()).unwrap();
        assert!(matches!(
            svc.detail(&ctx(Role::Admin)),
            Err(RecordError::NotFound("patient"))
        ));
    }
}
