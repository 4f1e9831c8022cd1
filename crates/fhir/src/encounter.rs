//! FHIR-aligned encounter wire model.
//!
//! One file per clinical visit, stored as `encounters/<timestamp-id>.yaml` inside the patient
//! repository. Encounters are append-only: once written they are never rewritten.

use crate::patient::{parse_date, parse_reference, parse_timestamp};
use crate::{parse_strict, FhirError, FhirResult};
use chrono::{DateTime, NaiveDate, Utc};
use chs_uuid::{ShardableUuid, TimestampUuid};
use serde::{Deserialize, Serialize};

const PATIENT_PREFIX: &str = "Patient/";
const PRACTITIONER_PREFIX: &str = "Practitioner/";

/// Kind of clinical visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterType {
    Consultation,
    Screening,
    Vaccination,
    FollowUp,
    Emergency,
    Antenatal,
    Postnatal,
    FamilyPlanning,
    ChronicCare,
}

impl EncounterType {
    pub const ALL: [EncounterType; 9] = [
        EncounterType::Consultation,
        EncounterType::Screening,
        EncounterType::Vaccination,
        EncounterType::FollowUp,
        EncounterType::Emergency,
        EncounterType::Antenatal,
        EncounterType::Postnatal,
        EncounterType::FamilyPlanning,
        EncounterType::ChronicCare,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EncounterType::Consultation => "consultation",
            EncounterType::Screening => "screening",
            EncounterType::Vaccination => "vaccination",
            EncounterType::FollowUp => "follow_up",
            EncounterType::Emergency => "emergency",
            EncounterType::Antenatal => "antenatal",
            EncounterType::Postnatal => "postnatal",
            EncounterType::FamilyPlanning => "family_planning",
            EncounterType::ChronicCare => "chronic_care",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

/// Vital signs captured during an encounter. Every reading is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VitalSigns {
    #[serde(rename = "weightKg", skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(rename = "heightCm", skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f64>,
    #[serde(rename = "temperatureC", skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f64>,
    #[serde(rename = "systolicBp", skip_serializing_if = "Option::is_none")]
    pub systolic_bp: Option<u16>,
    #[serde(rename = "diastolicBp", skip_serializing_if = "Option::is_none")]
    pub diastolic_bp: Option<u16>,
    #[serde(rename = "pulseRate", skip_serializing_if = "Option::is_none")]
    pub pulse_rate: Option<u16>,
}

impl VitalSigns {
    fn is_empty(&self) -> bool {
        *self == VitalSigns::default()
    }
}

/// Domain-level carrier for one encounter.
#[derive(Clone, Debug, PartialEq)]
pub struct EncounterData {
    pub id: TimestampUuid,
    pub patient_id: ShardableUuid,
    pub encounter_type: EncounterType,
    pub encounter_date: DateTime<Utc>,
    pub vitals: VitalSigns,
    pub chief_complaint: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment_plan: Option<String>,
    pub medications_prescribed: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub provider_id: ShardableUuid,
    pub facility_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Encounter resource operations.
pub struct Encounter;

impl Encounter {
    /// Parse an encounter resource from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] on schema mismatch, a wrong `resourceType`, an unknown encounter
    /// type, or malformed identifiers, references and dates.
    pub fn parse(yaml_text: &str) -> FhirResult<EncounterData> {
        let wire: EncounterWire = parse_strict(yaml_text, "Encounter")?;

        if wire.resource_type != "Encounter" {
            return Err(FhirError::InvalidInput(format!(
                "Expected resourceType 'Encounter', got '{}'",
                wire.resource_type
            )));
        }

        let id = wire
            .id
            .parse::<TimestampUuid>()
            .map_err(|e| FhirError::Translation(format!("Invalid encounter ID: {e}")))?;
        let encounter_type = EncounterType::from_wire(&wire.encounter_type).ok_or_else(|| {
            FhirError::Translation(format!("Unknown encounter type '{}'", wire.encounter_type))
        })?;

        Ok(EncounterData {
            id,
            patient_id: parse_reference(PATIENT_PREFIX, &wire.subject.reference)?,
            encounter_type,
            encounter_date: parse_timestamp("period.start", &wire.period.start)?,
            vitals: wire.vital_signs.unwrap_or_default(),
            chief_complaint: wire.reason.map(|r| r.text),
            diagnosis: wire.diagnosis,
            treatment_plan: wire.treatment_plan,
            medications_prescribed: wire.medications_prescribed,
            follow_up_date: wire
                .follow_up_date
                .as_deref()
                .map(|d| parse_date("followUpDate", d))
                .transpose()?,
            provider_id: parse_reference(PRACTITIONER_PREFIX, &wire.participant.reference)?,
            facility_name: wire.service_provider.map(|s| s.display),
            created_at: parse_timestamp("meta.created", &wire.meta.created)?,
        })
    }

    /// Render an encounter resource as YAML text.
    pub fn render(data: &EncounterData) -> FhirResult<String> {
        let wire = EncounterWire {
            resource_type: "Encounter".into(),
            id: data.id.to_string(),
            status: "finished".into(),
            encounter_type: data.encounter_type.as_str().into(),
            subject: ReferenceWire {
                reference: format!("{PATIENT_PREFIX}{}", data.patient_id),
            },
            participant: ReferenceWire {
                reference: format!("{PRACTITIONER_PREFIX}{}", data.provider_id),
            },
            period: PeriodWire {
                start: data.encounter_date.to_rfc3339(),
            },
            service_provider: data
                .facility_name
                .as_ref()
                .map(|f| DisplayWire { display: f.clone() }),
            reason: data
                .chief_complaint
                .as_ref()
                .map(|c| TextWire { text: c.clone() }),
            diagnosis: data.diagnosis.clone(),
            vital_signs: (!data.vitals.is_empty()).then(|| data.vitals.clone()),
            treatment_plan: data.treatment_plan.clone(),
            medications_prescribed: data.medications_prescribed.clone(),
            follow_up_date: data
                .follow_up_date
                .map(|d| d.format("%Y-%m-%d").to_string()),
            meta: MetaWire {
                created: data.created_at.to_rfc3339(),
            },
        };

        serde_yaml::to_string(&wire)
            .map_err(|e| FhirError::Translation(format!("Failed to serialise encounter: {e}")))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
struct EncounterWire {
    #[serde(rename = "resourceType")]
    resource_type: String,
    id: String,
    status: String,
    #[serde(rename = "type")]
    encounter_type: String,
    subject: ReferenceWire,
    participant: ReferenceWire,
    period: PeriodWire,
    #[serde(rename = "serviceProvider", skip_serializing_if = "Option::is_none")]
    service_provider: Option<DisplayWire>,
    #[serde(rename = "reasonCode", skip_serializing_if = "Option::is_none")]
    reason: Option<TextWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnosis: Option<String>,
    #[serde(rename = "vitalSigns", skip_serializing_if = "Option::is_none")]
    vital_signs: Option<VitalSigns>,
    #[serde(rename = "treatmentPlan", skip_serializing_if = "Option::is_none")]
    treatment_plan: Option<String>,
    #[serde(rename = "medicationsPrescribed", skip_serializing_if = "Option::is_none")]
    medications_prescribed: Option<String>,
    #[serde(rename = "followUpDate", skip_serializing_if = "Option::is_none")]
    follow_up_date: Option<String>,
    meta: MetaWire,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct ReferenceWire {
    reference: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct PeriodWire {
    start: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct DisplayWire {
    display: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct TextWire {
    text: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct MetaWire {
    created: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"resourceType: Encounter
id: 20260119T101500.000Z-550e8400e29b41d4a716446655440000
status: finished
type: antenatal
subject:
  reference: Patient/90a8d1ea318041d9adb070a834d4e0f6
participant:
  reference: Practitioner/4b3c2d1e0f9a48b7a6c5d4e3f2a1b0c9
period:
  start: 2026-01-19T10:15:00Z
serviceProvider:
  display: Kondele Health Centre
reasonCode:
  text: Routine antenatal visit
vitalSigns:
  weightKg: 64.5
  heightCm: 162.0
  systolicBp: 118
  diastolicBp: 76
followUpDate: 2026-02-16
meta:
  created: 2026-01-19T10:20:00Z
"#;

    #[test]
    fn parses_sample_encounter() {
        let encounter = Encounter::parse(SAMPLE).expect("parse encounter");
        assert_eq!(encounter.encounter_type, EncounterType::Antenatal);
        assert_eq!(
            encounter.patient_id.to_string(),
            "90a8d1ea318041d9adb070a834d4e0f6"
        );
        assert_eq!(encounter.vitals.weight_kg, Some(64.5));
        assert_eq!(encounter.vitals.pulse_rate, None);
        assert_eq!(
            encounter.chief_complaint.as_deref(),
            Some("Routine antenatal visit")
        );
        assert_eq!(
            encounter.follow_up_date,
            NaiveDate::from_ymd_opt(2026, 2, 16)
        );
    }

    #[test]
    fn render_then_parse_preserves_encounter() {
        let encounter = Encounter::parse(SAMPLE).expect("parse encounter");
        let yaml = Encounter::render(&encounter).expect("render");
        assert_eq!(Encounter::parse(&yaml).expect("reparse"), encounter);
    }

    #[test]
    fn empty_vitals_are_omitted() {
        let mut encounter = Encounter::parse(SAMPLE).expect("parse encounter");
        encounter.vitals = VitalSigns::default();
        let yaml = Encounter::render(&encounter).expect("render");
        assert!(!yaml.contains("vitalSigns"));
    }

    #[test]
    fn rejects_unknown_encounter_type() {
        let input = SAMPLE.replace("type: antenatal", "type: surgery");
        let err = Encounter::parse(&input).expect_err("unknown type");
        assert!(matches!(err, FhirError::Translation(msg) if msg.contains("surgery")));
    }

    #[test]
    fn rejects_subject_that_is_not_a_patient() {
        let input = SAMPLE.replace(
            "reference: Patient/90a8",
            "reference: Practitioner/90a8",
        );
        assert!(Encounter::parse(&input).is_err());
    }

    #[test]
    fn encounter_type_wire_names_round_trip() {
        for kind in EncounterType::ALL {
            assert_eq!(EncounterType::from_wire(kind.as_str()), Some(kind));
        }
    }
}
