use crate::error::ApiResult;
use crate::session::Session;
use crate::AppState;
use api_shared::{
    AttendanceReq, AttendanceRes, ErrorRes, EventDetailRes, EventReq, EventRes, ListEventsQuery,
    ListEventsRes, MessageRes,
};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chs_core::outreach::event_res;
use chs_core::OutreachService;

#[utoipa::path(
    get,
    path = "/outreach",
    params(ListEventsQuery),
    responses(
        (status = 200, description = "Events, latest start date first", body = ListEventsRes),
        (status = 401, description = "Not logged in", body = ErrorRes)
    )
)]
/// List outreach events
///
/// Community health workers only see the events they organise.
#[axum::debug_handler]
pub async fn list_events(
    State(state): State<AppState>,
    Session(ctx): Session,
    Query(query): Query<ListEventsQuery>,
) -> ApiResult<Json<ListEventsRes>> {
    let svc = OutreachService::new(state.cfg.clone());
    let events = svc
        .list(&ctx, query.status.as_deref())?
        .iter()
        .map(|e| event_res(e, svc.attendance_count(&e.id)))
        .collect();
    Ok(Json(ListEventsRes { events }))
}

#[utoipa::path(
    post,
    path = "/outreach",
    request_body = EventReq,
    responses(
        (status = 201, description = "Event created", body = EventRes),
        (status = 422, description = "Validation failed", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn create_event(
    State(state): State<AppState>,
    Session(ctx): Session,
    Json(req): Json<EventReq>,
) -> ApiResult<(StatusCode, Json<EventRes>)> {
    let event = OutreachService::new(state.cfg.clone()).create(&ctx, &req)?;
    Ok((StatusCode::CREATED, Json(event_res(&event, 0))))
}

#[utoipa::path(
    get,
    path = "/outreach/{id}",
    params(("id" = String, Path, description = "Event id")),
    responses(
        (status = 200, description = "Event with its attendance list", body = EventDetailRes),
        (status = 404, description = "Event not found", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn get_event(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(id): Path<String>,
) -> ApiResult<Json<EventDetailRes>> {
    let detail = OutreachService::new(state.cfg.clone()).detail(&ctx, &id)?;
    Ok(Json(detail.into_res()))
}

#[utoipa::path(
    put,
    path = "/outreach/{id}",
    params(("id" = String, Path, description = "Event id")),
    request_body = EventReq,
    responses(
        (status = 200, description = "Event updated", body = EventRes),
        (status = 403, description = "Only the organiser or an administrator may edit", body = ErrorRes),
        (status = 404, description = "Event not found", body = ErrorRes),
        (status = 422, description = "Validation failed", body = ErrorRes)
    )
)]
/// Update an outreach event (organiser or administrator)
#[axum::debug_handler]
pub async fn update_event(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(id): Path<String>,
    Json(req): Json<EventReq>,
) -> ApiResult<Json<EventRes>> {
    let svc = OutreachService::new(state.cfg.clone());
    let event = svc.update(&ctx, &id, &req)?;
    Ok(Json(event_res(&event, svc.attendance_count(&event.id))))
}

#[utoipa::path(
    delete,
    path = "/outreach/{id}",
    params(("id" = String, Path, description = "Event id")),
    responses(
        (status = 200, description = "Event and its attendance records deleted", body = MessageRes),
        (status = 403, description = "Only the organiser or an administrator may delete", body = ErrorRes),
        (status = 404, description = "Event not found", body = ErrorRes)
    )
)]
/// Delete an outreach event (organiser or administrator)
///
/// Attendance records of the event are deleted with it.
#[axum::debug_handler]
pub async fn delete_event(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageRes>> {
    OutreachService::new(state.cfg.clone()).delete(&ctx, &id)?;
    Ok(Json(MessageRes {
        message: "Outreach event deleted successfully.".into(),
    }))
}

#[utoipa::path(
    post,
    path = "/outreach/{id}/attend",
    params(("id" = String, Path, description = "Event id")),
    request_body = AttendanceReq,
    responses(
        (status = 201, description = "Attendance recorded", body = AttendanceRes),
        (status = 403, description = "Access denied to the patient", body = ErrorRes),
        (status = 404, description = "Event or patient not found", body = ErrorRes),
        (status = 409, description = "Already recorded, or the event is full", body = ErrorRes)
    )
)]
/// Record a patient's attendance at an event
///
/// # Errors
/// Returns `409 Conflict` when the patient is already on the attendance list or the event has
/// reached its participant limit.
#[axum::debug_handler]
pub async fn record_attendance(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(id): Path<String>,
    Json(req): Json<AttendanceReq>,
) -> ApiResult<(StatusCode, Json<AttendanceRes>)> {
    let attendance = OutreachService::new(state.cfg.clone()).record_attendance(&ctx, &id, &req)?;
    Ok((StatusCode::CREATED, Json(AttendanceRes::from(&attendance))))
}
