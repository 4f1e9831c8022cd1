//! FHIR-aligned patient wire model and translation helpers.
//!
//! This module provides both the domain-level carrier ([`PatientData`]) and the strict wire
//! model for `patient.yaml`.
//!
//! Responsibilities:
//! - Define public domain-level types for service and API use
//! - Define a strict wire model for serialisation/deserialisation
//! - Translate between the two, enforcing required identifiers and code values
//!
//! Mapping notes:
//! - patient number, national id and NHIF number are `identifier` entries keyed by system
//! - status maps onto `active` plus `deceasedBoolean`
//! - the assigned community health worker is the `generalPractitioner` reference
//! - blood group, allergies and chronic conditions live under `extension`

use crate::{parse_strict, FhirError, FhirResult};
use chrono::{DateTime, NaiveDate, Utc};
use chs_uuid::ShardableUuid;
use serde::{Deserialize, Serialize};

/// Identifier system for the generated `CHS...` patient number.
pub const PATIENT_NUMBER_SYSTEM: &str = "urn:chs:patient-number";
/// Identifier system for the Kenyan national id.
pub const NATIONAL_ID_SYSTEM: &str = "urn:ke:national-id";
/// Identifier system for the NHIF membership number.
pub const NHIF_SYSTEM: &str = "urn:ke:nhif";

const PRACTITIONER_PREFIX: &str = "Practitioner/";

// ============================================================================
// Public domain-level types
// ============================================================================

/// Administrative gender.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            _ => None,
        }
    }
}

/// Lifecycle status of a patient record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatientStatus {
    Active,
    Inactive,
    Deceased,
}

impl PatientStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PatientStatus::Active => "active",
            PatientStatus::Inactive => "inactive",
            PatientStatus::Deceased => "deceased",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PatientStatus::Active),
            "inactive" => Some(PatientStatus::Inactive),
            "deceased" => Some(PatientStatus::Deceased),
            _ => None,
        }
    }

    fn to_wire(self) -> (bool, bool) {
        match self {
            PatientStatus::Active => (true, false),
            PatientStatus::Inactive => (false, false),
            PatientStatus::Deceased => (false, true),
        }
    }

    fn from_wire(active: bool, deceased: bool) -> Self {
        match (active, deceased) {
            (_, true) => PatientStatus::Deceased,
            (true, false) => PatientStatus::Active,
            (false, false) => PatientStatus::Inactive,
        }
    }
}

/// Postal/administrative address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatientAddress {
    pub county: Option<String>,
    pub subcounty: Option<String>,
    pub ward: Option<String>,
    pub village: Option<String>,
    /// Free-text address line.
    pub line: Option<String>,
}

impl PatientAddress {
    fn is_empty(&self) -> bool {
        self.county.is_none()
            && self.subcounty.is_none()
            && self.ward.is_none()
            && self.village.is_none()
            && self.line.is_none()
    }
}

/// Person to contact in an emergency.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmergencyContact {
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// Domain-level carrier for a patient record (flat structure).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientData {
    pub id: ShardableUuid,
    pub patient_number: String,
    pub national_id: Option<String>,
    pub nhif_number: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: PatientAddress,
    pub blood_group: Option<String>,
    pub allergies: Option<String>,
    pub chronic_conditions: Option<String>,
    pub emergency_contact: EmergencyContact,
    /// Community health worker responsible for this patient.
    pub assigned_chw: Option<ShardableUuid>,
    pub status: PatientStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientData {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Age in whole years on `today`.
    pub fn age_on(&self, today: NaiveDate) -> u32 {
        today.years_since(self.birth_date).unwrap_or(0)
    }
}

// ============================================================================
// Public Patient operations
// ============================================================================

/// Patient resource operations.
///
/// This is a zero-sized type used for namespacing patient-related operations.
pub struct Patient;

impl Patient {
    /// Parse a patient resource from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if:
    /// - the YAML does not match the wire schema (unknown keys, wrong types),
    /// - `resourceType` is not `Patient`,
    /// - the patient number identifier is missing,
    /// - a code value (gender) or date is not recognised.
    pub fn parse(yaml_text: &str) -> FhirResult<PatientData> {
        let wire: PatientWire = parse_strict(yaml_text, "Patient")?;

        if wire.resource_type != "Patient" {
            return Err(FhirError::InvalidInput(format!(
                "Expected resourceType 'Patient', got '{}'",
                wire.resource_type
            )));
        }

        wire_to_domain(wire)
    }

    /// Render a patient resource as YAML text.
    pub fn render(data: &PatientData) -> FhirResult<String> {
        let wire = domain_to_wire(data);
        serde_yaml::to_string(&wire)
            .map_err(|e| FhirError::Translation(format!("Failed to serialise patient: {e}")))
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct PatientWire {
    #[serde(rename = "resourceType")]
    resource_type: String,

    id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    identifier: Vec<IdentifierWire>,

    active: bool,

    #[serde(rename = "deceasedBoolean", default, skip_serializing_if = "is_false")]
    deceased: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    name: Vec<HumanNameWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    telecom: Vec<ContactPointWire>,

    gender: String,

    #[serde(rename = "birthDate")]
    birth_date: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    address: Vec<AddressWire>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    contact: Vec<ContactWire>,

    #[serde(rename = "generalPractitioner", skip_serializing_if = "Option::is_none")]
    general_practitioner: Option<ReferenceWire>,

    #[serde(skip_serializing_if = "Option::is_none")]
    extension: Option<PatientExtensionWire>,

    meta: MetaWire,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct IdentifierWire {
    system: String,
    value: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct HumanNameWire {
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    use_type: Option<String>,

    family: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    given: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct ContactPointWire {
    system: String,
    value: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct AddressWire {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    line: Vec<String>,
    /// Village.
    #[serde(skip_serializing_if = "Option::is_none")]
    city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ward: Option<String>,
    /// Subcounty.
    #[serde(skip_serializing_if = "Option::is_none")]
    district: Option<String>,
    /// County.
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct ContactWire {
    relationship: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    telecom: Vec<ContactPointWire>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct ReferenceWire {
    reference: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct PatientExtensionWire {
    #[serde(rename = "bloodGroup", skip_serializing_if = "Option::is_none")]
    blood_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allergies: Option<String>,
    #[serde(rename = "chronicConditions", skip_serializing_if = "Option::is_none")]
    chronic_conditions: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct MetaWire {
    created: String,
    #[serde(rename = "lastUpdated")]
    last_updated: String,
}

fn is_false(b: &bool) -> bool {
    !*b
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

pub(crate) fn parse_timestamp(field: &str, value: &str) -> FhirResult<DateTime<Utc>> {
    value
        .parse::<DateTime<Utc>>()
        .map_err(|e| FhirError::Translation(format!("Invalid {field} '{value}': {e}")))
}

pub(crate) fn parse_date(field: &str, value: &str) -> FhirResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| FhirError::Translation(format!("Invalid {field} '{value}': {e}")))
}

pub(crate) fn parse_reference(
    expected_prefix: &str,
    reference: &str,
) -> FhirResult<ShardableUuid> {
    let id = reference.strip_prefix(expected_prefix).ok_or_else(|| {
        FhirError::Translation(format!(
            "Reference '{reference}' must start with '{expected_prefix}'"
        ))
    })?;
    ShardableUuid::parse(id)
        .map_err(|e| FhirError::Translation(format!("Invalid reference id: {e}")))
}

fn identifier_value(identifiers: &[IdentifierWire], system: &str) -> Option<String> {
    identifiers
        .iter()
        .find(|i| i.system == system)
        .map(|i| i.value.clone())
}

fn contact_point(points: &[ContactPointWire], system: &str) -> Option<String> {
    points
        .iter()
        .find(|p| p.system == system)
        .map(|p| p.value.clone())
}

fn wire_to_domain(wire: PatientWire) -> FhirResult<PatientData> {
    let id = ShardableUuid::parse(&wire.id)
        .map_err(|e| FhirError::Translation(format!("Invalid patient ID: {e}")))?;

    let patient_number = identifier_value(&wire.identifier, PATIENT_NUMBER_SYSTEM)
        .ok_or_else(|| FhirError::Translation("Patient number identifier is missing".into()))?;

    let name = wire
        .name
        .into_iter()
        .next()
        .ok_or_else(|| FhirError::Translation("Patient name is missing".into()))?;
    let first_name = name.given.join(" ");

    let gender = Gender::from_wire(&wire.gender)
        .ok_or_else(|| FhirError::Translation(format!("Unknown gender '{}'", wire.gender)))?;

    let address = wire
        .address
        .into_iter()
        .next()
        .map(|a| PatientAddress {
            county: a.state,
            subcounty: a.district,
            ward: a.ward,
            village: a.city,
            line: a.line.into_iter().next(),
        })
        .unwrap_or_default();

    let emergency_contact = wire
        .contact
        .into_iter()
        .find(|c| c.relationship == "emergency")
        .map(|c| EmergencyContact {
            phone: contact_point(&c.telecom, "phone"),
            name: c.name,
        })
        .unwrap_or_default();

    let assigned_chw = wire
        .general_practitioner
        .map(|r| parse_reference(PRACTITIONER_PREFIX, &r.reference))
        .transpose()?;

    let extension = wire.extension;

    Ok(PatientData {
        id,
        patient_number,
        national_id: identifier_value(&wire.identifier, NATIONAL_ID_SYSTEM),
        nhif_number: identifier_value(&wire.identifier, NHIF_SYSTEM),
        first_name,
        last_name: name.family,
        birth_date: parse_date("birthDate", &wire.birth_date)?,
        gender,
        phone: contact_point(&wire.telecom, "phone"),
        email: contact_point(&wire.telecom, "email"),
        address,
        blood_group: extension.as_ref().and_then(|e| e.blood_group.clone()),
        allergies: extension.as_ref().and_then(|e| e.allergies.clone()),
        chronic_conditions: extension.and_then(|e| e.chronic_conditions),
        emergency_contact,
        assigned_chw,
        status: PatientStatus::from_wire(wire.active, wire.deceased),
        created_at: parse_timestamp("meta.created", &wire.meta.created)?,
        updated_at: parse_timestamp("meta.lastUpdated", &wire.meta.last_updated)?,
    })
}

fn domain_to_wire(data: &PatientData) -> PatientWire {
    let mut identifier = vec![IdentifierWire {
        system: PATIENT_NUMBER_SYSTEM.into(),
        value: data.patient_number.clone(),
    }];
    if let Some(national_id) = &data.national_id {
        identifier.push(IdentifierWire {
            system: NATIONAL_ID_SYSTEM.into(),
            value: national_id.clone(),
        });
    }
    if let Some(nhif) = &data.nhif_number {
        identifier.push(IdentifierWire {
            system: NHIF_SYSTEM.into(),
            value: nhif.clone(),
        });
    }

    let telecom = [("phone", &data.phone), ("email", &data.email)]
        .into_iter()
        .filter_map(|(system, value)| {
            value.as_ref().map(|v| ContactPointWire {
                system: system.into(),
                value: v.clone(),
            })
        })
        .collect();

    let address = if data.address.is_empty() {
        vec![]
    } else {
        vec![AddressWire {
            line: data.address.line.iter().cloned().collect(),
            city: data.address.village.clone(),
            ward: data.address.ward.clone(),
            district: data.address.subcounty.clone(),
            state: data.address.county.clone(),
        }]
    };

    let contact = if data.emergency_contact == EmergencyContact::default() {
        vec![]
    } else {
        vec![ContactWire {
            relationship: "emergency".into(),
            name: data.emergency_contact.name.clone(),
            telecom: data
                .emergency_contact
                .phone
                .iter()
                .map(|p| ContactPointWire {
                    system: "phone".into(),
                    value: p.clone(),
                })
                .collect(),
        }]
    };

    let extension = if data.blood_group.is_some()
        || data.allergies.is_some()
        || data.chronic_conditions.is_some()
    {
        Some(PatientExtensionWire {
            blood_group: data.blood_group.clone(),
            allergies: data.allergies.clone(),
            chronic_conditions: data.chronic_conditions.clone(),
        })
    } else {
        None
    };

    let (active, deceased) = data.status.to_wire();

    PatientWire {
        resource_type: "Patient".into(),
        id: data.id.to_string(),
        identifier,
        active,
        deceased,
        name: vec![HumanNameWire {
            use_type: Some("official".into()),
            family: data.last_name.clone(),
            given: vec![data.first_name.clone()],
        }],
        telecom,
        gender: data.gender.as_str().into(),
        birth_date: data.birth_date.format("%Y-%m-%d").to_string(),
        address,
        contact,
        general_practitioner: data.assigned_chw.as_ref().map(|id| ReferenceWire {
            reference: format!("{PRACTITIONER_PREFIX}{id}"),
        }),
        extension,
        meta: MetaWire {
            created: data.created_at.to_rfc3339(),
            last_updated: data.updated_at.to_rfc3339(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"resourceType: Patient
id: 90a8d1ea318041d9adb070a834d4e0f6
identifier:
  - system: urn:chs:patient-number
    value: CHS2026011990A8D1EA
  - system: urn:ke:national-id
    value: "28765432"
active: true
name:
  - use: official
    family: Otieno
    given:
      - Achieng
telecom:
  - system: phone
    value: "+254712345678"
gender: female
birthDate: 1992-03-20
address:
  - city: Kondele
    district: Kisumu Central
    state: Kisumu
contact:
  - relationship: emergency
    name: Ochieng Otieno
    telecom:
      - system: phone
        value: "+254700111222"
generalPractitioner:
  reference: Practitioner/4b3c2d1e0f9a48b7a6c5d4e3f2a1b0c9
extension:
  bloodGroup: O+
meta:
  created: 2026-01-19T08:00:00Z
  lastUpdated: 2026-01-19T09:30:00Z
"#;

    #[test]
    fn parses_sample_patient() {
        let patient = Patient::parse(SAMPLE).expect("parse yaml");

        assert_eq!(patient.patient_number, "CHS2026011990A8D1EA");
        assert_eq!(patient.national_id.as_deref(), Some("28765432"));
        assert_eq!(patient.nhif_number, None);
        assert_eq!(patient.full_name(), "Achieng Otieno");
        assert_eq!(patient.gender, Gender::Female);
        assert_eq!(patient.address.county.as_deref(), Some("Kisumu"));
        assert_eq!(patient.address.village.as_deref(), Some("Kondele"));
        assert_eq!(
            patient.emergency_contact.phone.as_deref(),
            Some("+254700111222")
        );
        assert_eq!(
            patient.assigned_chw.map(|id| id.to_string()).as_deref(),
            Some("4b3c2d1e0f9a48b7a6c5d4e3f2a1b0c9")
        );
        assert_eq!(patient.blood_group.as_deref(), Some("O+"));
        assert_eq!(patient.status, PatientStatus::Active);
    }

    #[test]
    fn render_then_parse_preserves_record() {
        let patient = Patient::parse(SAMPLE).expect("parse yaml");
        let output = Patient::render(&patient).expect("render patient");
        let reparsed = Patient::parse(&output).expect("reparse yaml");
        assert_eq!(patient, reparsed);
    }

    #[test]
    fn deceased_status_survives_rendering() {
        let mut patient = Patient::parse(SAMPLE).expect("parse yaml");
        patient.status = PatientStatus::Deceased;

        let yaml = Patient::render(&patient).expect("render");
        assert!(yaml.contains("active: false"));
        assert!(yaml.contains("deceasedBoolean: true"));
        assert_eq!(
            Patient::parse(&yaml).expect("reparse").status,
            PatientStatus::Deceased
        );
    }

    #[test]
    fn strict_validation_rejects_unknown_keys() {
        let input = SAMPLE.replace("active: true", "active: true\nunexpected_key: 1");
        let err = Patient::parse(&input).expect_err("should reject unknown key");
        match err {
            FhirError::Translation(msg) => assert!(msg.contains("unexpected_key")),
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_resource_type() {
        let input = SAMPLE.replace("resourceType: Patient", "resourceType: Encounter");
        let err = Patient::parse(&input).expect_err("should reject resourceType");
        match err {
            FhirError::InvalidInput(msg) => assert!(msg.contains("Encounter")),
            other => panic!("expected InvalidInput error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_patient_number() {
        let input = SAMPLE.replace("urn:chs:patient-number", "urn:other");
        let err = Patient::parse(&input).expect_err("should require patient number");
        assert!(matches!(err, FhirError::Translation(msg) if msg.contains("Patient number")));
    }

    #[test]
    fn rejects_unknown_gender() {
        let input = SAMPLE.replace("gender: female", "gender: unknown");
        assert!(Patient::parse(&input).is_err());
    }

    #[test]
    fn age_counts_whole_years() {
        let patient = Patient::parse(SAMPLE).expect("parse yaml");
        let day_before = NaiveDate::from_ymd_opt(2026, 3, 19).unwrap();
        let birthday = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
        assert_eq!(patient.age_on(day_before), 33);
        assert_eq!(patient.age_on(birthday), 34);
    }
}
