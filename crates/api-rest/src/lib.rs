//! # API REST
//!
//! REST API implementation for the community health records service.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - Session cookies and request origin extraction ([`session`])
//! - Error to status mapping ([`error`])
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, request tracing)
//!
//! Uses `api-shared` for wire bodies and `chs-core` for every domain rule.

#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod session;

use api_shared::auth::SessionSigner;
use axum::routing::{get, post};
use axum::Router;
use chs_core::{CheckoutGateway, CoreConfig};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use config::RestConfig;

/// Application state shared by all handlers.
///
/// Holds only immutable configuration and the gateway handle; every request loads domain state
/// fresh from disk.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<CoreConfig>,
    pub sessions: Arc<SessionSigner>,
    pub gateway: Arc<dyn CheckoutGateway>,
    pub webhook_secret: Arc<str>,
    pub public_base_url: Option<Arc<str>>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::accounts::health,
        handlers::accounts::register,
        handlers::accounts::login,
        handlers::accounts::logout,
        handlers::accounts::dashboard,
        handlers::accounts::list_users,
        handlers::accounts::toggle_user_status,
        handlers::accounts::audit_trail,
        handlers::patients::list_patients,
        handlers::patients::create_patient,
        handlers::patients::get_patient,
        handlers::patients::update_patient,
        handlers::patients::create_health_record,
        handlers::patients::search_patients,
        handlers::outreach::list_events,
        handlers::outreach::create_event,
        handlers::outreach::get_event,
        handlers::outreach::update_event,
        handlers::outreach::delete_event,
        handlers::outreach::record_attendance,
        handlers::payments::list_payments,
        handlers::payments::initiate_payment,
        handlers::payments::intasend_webhook,
    ),
    components(schemas(
        api_shared::HealthRes,
        api_shared::ErrorRes,
        api_shared::MessageRes,
        api_shared::RegisterReq,
        api_shared::LoginReq,
        api_shared::LoginRes,
        api_shared::AccountRes,
        api_shared::ListAccountsRes,
        api_shared::DashboardRes,
        api_shared::DashboardStatsRes,
        api_shared::AuditEntryRes,
        api_shared::ListAuditRes,
        api_shared::PatientReq,
        api_shared::PatientRes,
        api_shared::ListPatientsRes,
        api_shared::PatientDetailRes,
        api_shared::PatientSearchHit,
        api_shared::EncounterReq,
        api_shared::EncounterRes,
        api_shared::EventReq,
        api_shared::EventRes,
        api_shared::ListEventsRes,
        api_shared::EventDetailRes,
        api_shared::AttendanceReq,
        api_shared::AttendanceRes,
        api_shared::PaymentReq,
        api_shared::PaymentRes,
        api_shared::InitiatePaymentRes,
        api_shared::ListPaymentsRes,
        api_shared::WebhookAck,
    ))
)]
pub struct ApiDoc;

/// Builds the full router with tracing, CORS and Swagger UI.
pub fn router(state: AppState) -> Router {
    use handlers::{accounts, outreach, patients, payments};

    Router::new()
        .route("/health", get(accounts::health))
        .route("/register", post(accounts::register))
        .route("/login", post(accounts::login))
        .route("/logout", post(accounts::logout))
        .route("/dashboard", get(accounts::dashboard))
        .route("/users", get(accounts::list_users))
        .route("/users/:id/toggle_status", post(accounts::toggle_user_status))
        .route("/audit", get(accounts::audit_trail))
        .route(
            "/patients",
            get(patients::list_patients).post(patients::create_patient),
        )
        .route(
            "/patients/:id",
            get(patients::get_patient).put(patients::update_patient),
        )
        .route(
            "/patients/:id/health_records",
            post(patients::create_health_record),
        )
        .route("/api/patients/search", get(patients::search_patients))
        .route(
            "/outreach",
            get(outreach::list_events).post(outreach::create_event),
        )
        .route(
            "/outreach/:id",
            get(outreach::get_event)
                .put(outreach::update_event)
                .delete(outreach::delete_event),
        )
        .route("/outreach/:id/attend", post(outreach::record_attendance))
        .route(
            "/payments",
            get(payments::list_payments).post(payments::initiate_payment),
        )
        .route("/webhooks/intasend", post(payments::intasend_webhook))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
