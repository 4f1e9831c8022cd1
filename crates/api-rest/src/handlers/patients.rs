use crate::error::ApiResult;
use crate::session::Session;
use crate::AppState;
use api_shared::{
    EncounterReq, EncounterRes, ErrorRes, ListPatientsQuery, ListPatientsRes, PatientDetailRes,
    PatientReq, PatientRes, PatientSearchHit, PatientSearchQuery,
};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chs_core::patients::{encounter_res, patient_res};
use chs_core::{Initialised, Operation, PatientService, RecordError};

/// Binds a patient service to a path id. Ids that cannot name a patient are reported as 404.
fn bound(state: &AppState, id: &str) -> Result<PatientService<Initialised>, RecordError> {
    PatientService::with_id(state.cfg.clone(), id).map_err(|_| RecordError::NotFound("patient"))
}

#[utoipa::path(
    get,
    path = "/patients",
    params(ListPatientsQuery),
    responses(
        (status = 200, description = "Active patients visible to the caller", body = ListPatientsRes),
        (status = 401, description = "Not logged in", body = ErrorRes)
    )
)]
/// List active patients
///
/// Community health workers only see the patients assigned to them. `search` matches first
/// name, last name, patient number or national id.
#[axum::debug_handler]
pub async fn list_patients(
    State(state): State<AppState>,
    Session(ctx): Session,
    Query(query): Query<ListPatientsQuery>,
) -> ApiResult<Json<ListPatientsRes>> {
    let patients = PatientService::new(state.cfg.clone())
        .list(&ctx, query.search.as_deref())?
        .iter()
        .map(patient_res)
        .collect();
    Ok(Json(ListPatientsRes { patients }))
}

#[utoipa::path(
    post,
    path = "/patients",
    request_body = PatientReq,
    responses(
        (status = 201, description = "Patient registered", body = PatientRes),
        (status = 409, description = "National id already registered", body = ErrorRes),
        (status = 422, description = "Validation failed", body = ErrorRes)
    )
)]
/// Register a patient
///
/// Creates the patient's versioned record with an initial commit. A community health worker
/// becomes the assigned worker of the patients they register.
#[axum::debug_handler]
pub async fn create_patient(
    State(state): State<AppState>,
    Session(ctx): Session,
    Json(req): Json<PatientReq>,
) -> ApiResult<(StatusCode, Json<PatientRes>)> {
    let patient = PatientService::new(state.cfg.clone())
        .create(&ctx, &req)?
        .read(&ctx, Operation::ReadPatient)?;
    tracing::info!("patient {} registered", patient.patient_number);
    Ok((StatusCode::CREATED, Json(patient_res(&patient))))
}

#[utoipa::path(
    get,
    path = "/patients/{id}",
    params(("id" = String, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient with recent encounters and payments", body = PatientDetailRes),
        (status = 403, description = "Access denied", body = ErrorRes),
        (status = 404, description = "Patient not found", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(id): Path<String>,
) -> ApiResult<Json<PatientDetailRes>> {
    let detail = bound(&state, &id)?.detail(&ctx)?;
    Ok(Json(detail.into_res()))
}

#[utoipa::path(
    put,
    path = "/patients/{id}",
    params(("id" = String, Path, description = "Patient id")),
    request_body = PatientReq,
    responses(
        (status = 200, description = "Patient updated", body = PatientRes),
        (status = 403, description = "Access denied", body = ErrorRes),
        (status = 404, description = "Patient not found", body = ErrorRes),
        (status = 409, description = "National id already registered", body = ErrorRes),
        (status = 422, description = "Validation failed", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn update_patient(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(id): Path<String>,
    Json(req): Json<PatientReq>,
) -> ApiResult<Json<PatientRes>> {
    let patient = bound(&state, &id)?.update(&ctx, &req)?;
    Ok(Json(patient_res(&patient)))
}

#[utoipa::path(
    post,
    path = "/patients/{id}/health_records",
    params(("id" = String, Path, description = "Patient id")),
    request_body = EncounterReq,
    responses(
        (status = 201, description = "Encounter recorded", body = EncounterRes),
        (status = 403, description = "Access denied", body = ErrorRes),
        (status = 404, description = "Patient not found", body = ErrorRes),
        (status = 422, description = "Validation failed", body = ErrorRes)
    )
)]
/// Record a clinical encounter
///
/// The provider is the caller; the facility defaults to the caller's facility.
#[axum::debug_handler]
pub async fn create_health_record(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(id): Path<String>,
    Json(req): Json<EncounterReq>,
) -> ApiResult<(StatusCode, Json<EncounterRes>)> {
    let encounter = bound(&state, &id)?.add_encounter(&ctx, &req)?;
    Ok((StatusCode::CREATED, Json(encounter_res(&encounter))))
}

#[utoipa::path(
    get,
    path = "/api/patients/search",
    params(PatientSearchQuery),
    responses(
        (status = 200, description = "At most ten matches; empty for queries under two characters", body = [PatientSearchHit]),
        (status = 401, description = "Not logged in", body = ErrorRes)
    )
)]
/// Quick patient search for form autocompletion
#[axum::debug_handler]
pub async fn search_patients(
    State(state): State<AppState>,
    Session(ctx): Session,
    Query(query): Query<PatientSearchQuery>,
) -> ApiResult<Json<Vec<PatientSearchHit>>> {
    let q = query.q.unwrap_or_default();
    let hits = PatientService::new(state.cfg.clone()).search(&ctx, &q)?;
    Ok(Json(hits))
}
