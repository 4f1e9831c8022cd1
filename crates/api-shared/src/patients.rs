//! Patient and encounter bodies.

use crate::payments::PaymentRes;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Patient form used for both creation and update.
///
/// `status` is only honoured on update; new patients always start `active`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct PatientReq {
    pub first_name: String,
    pub last_name: String,
    /// `YYYY-MM-DD`, not in the future.
    pub date_of_birth: String,
    /// One of `male`, `female`, `other`.
    pub gender: String,
    #[serde(default)]
    pub national_id: Option<String>,
    #[serde(default)]
    pub nhif_number: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub county: Option<String>,
    #[serde(default)]
    pub subcounty: Option<String>,
    #[serde(default)]
    pub ward: Option<String>,
    #[serde(default)]
    pub village: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub blood_group: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub chronic_conditions: Option<String>,
    #[serde(default)]
    pub emergency_contact_name: Option<String>,
    #[serde(default)]
    pub emergency_contact_phone: Option<String>,
    /// One of `active`, `inactive`, `deceased`.
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PatientRes {
    pub id: String,
    pub patient_number: String,
    pub national_id: Option<String>,
    pub nhif_number: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub date_of_birth: String,
    pub age: u32,
    pub gender: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub county: Option<String>,
    pub subcounty: Option<String>,
    pub ward: Option<String>,
    pub village: Option<String>,
    pub address: Option<String>,
    pub blood_group: Option<String>,
    pub allergies: Option<String>,
    pub chronic_conditions: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub assigned_chw_id: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ListPatientsRes {
    pub patients: Vec<PatientRes>,
}

#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListPatientsQuery {
    /// Substring of first name, last name, patient number or national id.
    pub search: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct PatientDetailRes {
    pub patient: PatientRes,
    /// Most recent encounters, newest first.
    pub encounters: Vec<EncounterRes>,
    /// Most recent payments linked to this patient, newest first.
    pub payments: Vec<PaymentRes>,
}

#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PatientSearchQuery {
    pub q: Option<String>,
}

/// Compact quick-search result.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PatientSearchHit {
    pub id: String,
    pub name: String,
    pub patient_number: String,
    pub age: u32,
}

/// Encounter (health record) form.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct EncounterReq {
    /// RFC 3339 timestamp; defaults to now.
    #[serde(default)]
    pub encounter_date: Option<String>,
    pub encounter_type: String,
    /// Kilograms, 0 to 500.
    #[serde(default)]
    pub weight: Option<f64>,
    /// Centimetres, 0 to 300.
    #[serde(default)]
    pub height: Option<f64>,
    /// Degrees Celsius, 30 to 50.
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub blood_pressure_systolic: Option<u16>,
    #[serde(default)]
    pub blood_pressure_diastolic: Option<u16>,
    #[serde(default)]
    pub pulse_rate: Option<u16>,
    #[serde(default)]
    pub chief_complaint: Option<String>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub treatment_plan: Option<String>,
    #[serde(default)]
    pub medications_prescribed: Option<String>,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub follow_up_date: Option<String>,
    /// Defaults to the recording clinician's facility.
    #[serde(default)]
    pub facility_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct EncounterRes {
    pub id: String,
    pub patient_id: String,
    pub encounter_type: String,
    pub encounter_date: String,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub bmi: Option<f64>,
    pub bmi_category: Option<String>,
    pub temperature: Option<f64>,
    pub blood_pressure_systolic: Option<u16>,
    pub blood_pressure_diastolic: Option<u16>,
    pub pulse_rate: Option<u16>,
    pub chief_complaint: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment_plan: Option<String>,
    pub medications_prescribed: Option<String>,
    pub follow_up_date: Option<String>,
    pub provider_id: String,
    pub facility_name: Option<String>,
    pub created_at: String,
}
