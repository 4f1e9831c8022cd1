//! FHIR-aligned wire models for the community health record store.
//!
//! This crate provides **wire models** and **format/translation helpers** for the YAML files
//! kept in each patient repository:
//! - `patient.yaml`, a Patient resource
//! - `encounters/<id>.yaml`, one Encounter resource per clinical visit
//!
//! The shapes follow FHIR naming (identifier, telecom, address, period, participant) without
//! implementing FHIR JSON/REST transport. Parsing is strict: unknown keys are rejected and the
//! failing path is reported.

pub mod encounter;
pub mod patient;

// Re-export facades
pub use encounter::Encounter;
pub use patient::Patient;

// Re-export public domain-level types
pub use encounter::{EncounterData, EncounterType, VitalSigns};
pub use patient::{EmergencyContact, Gender, PatientAddress, PatientData, PatientStatus};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid YAML: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),

    #[error("translation error: {0}")]
    Translation(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;

/// Deserialise `yaml_text` as `T`, reporting the failing field path on mismatch.
pub(crate) fn parse_strict<T>(yaml_text: &str, resource: &str) -> FhirResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let deserializer = serde_yaml::Deserializer::from_str(yaml_text);
    serde_path_to_error::deserialize::<_, T>(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let source = err.into_inner();
        let path = if path.is_empty() {
            "<root>"
        } else {
            path.as_str()
        };
        FhirError::Translation(format!("{resource} schema mismatch at {path}: {source}"))
    })
}
