use crate::error::{ApiError, ApiResult};
use crate::session::{Origin, Session};
use crate::AppState;
use api_shared::auth::{clear_session_cookie, session_cookie, SessionClaims};
use api_shared::{
    AccountRes, AuditEntryRes, AuditQuery, DashboardRes, ErrorRes, HealthRes, HealthService,
    ListAccountsQuery, ListAccountsRes, ListAuditRes, LoginReq, LoginRes, MessageRes,
    RegisterReq,
};
use axum::extract::{Path, Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use chs_core::constants::DEFAULT_AUDIT_LIMIT;
use chs_core::validation::NOT_A_CHOICE;
use chs_core::{
    AccountService, AuditService, DashboardService, Operation, RecordError, RequestContext, Role,
};
use chs_uuid::ShardableUuid;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancer probes.
#[axum::debug_handler]
pub async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "Account created", body = AccountRes),
        (status = 409, description = "Username or email already exists", body = ErrorRes),
        (status = 422, description = "Validation failed", body = ErrorRes)
    )
)]
/// Register a new account
///
/// Registration is open. The caller logs in separately afterwards.
///
/// # Errors
/// Returns `409 Conflict` if the username or email is taken, and `422 Unprocessable Entity`
/// with per-field messages for invalid input.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    Origin(origin): Origin,
    Json(req): Json<RegisterReq>,
) -> ApiResult<(StatusCode, Json<AccountRes>)> {
    let ctx = RequestContext::anonymous(origin);
    let account = AccountService::new(state.cfg.clone()).register(&ctx, &req)?;
    Ok((StatusCode::CREATED, Json(AccountRes::from(&account))))
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginReq,
    responses(
        (status = 200, description = "Logged in; session cookie set", body = LoginRes),
        (status = 401, description = "Invalid username, password, or account inactive", body = ErrorRes)
    )
)]
/// Log in and receive the session cookie
///
/// Every failure answers with the same message so that the response does not reveal whether
/// the username exists.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Origin(origin): Origin,
    Json(req): Json<LoginReq>,
) -> ApiResult<impl IntoResponse> {
    let ctx = RequestContext::anonymous(origin);
    let account =
        AccountService::new(state.cfg.clone()).login(&ctx, &req.username, &req.password)?;

    let claims = SessionClaims::for_account(account.id.to_string(), Utc::now());
    let token = state
        .sessions
        .issue(&claims)
        .map_err(|e| ApiError::Internal(format!("session issue failed: {e}")))?;

    let body = LoginRes {
        message: format!("Welcome back, {}!", account.full_name()),
        account: AccountRes::from(&account),
    };
    Ok(([(SET_COOKIE, session_cookie(&token))], Json(body)))
}

#[utoipa::path(
    post,
    path = "/logout",
    responses(
        (status = 200, description = "Logged out; session cookie cleared", body = MessageRes),
        (status = 401, description = "Not logged in", body = ErrorRes)
    )
)]
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Session(ctx): Session,
) -> ApiResult<impl IntoResponse> {
    AccountService::new(state.cfg.clone()).logout(&ctx)?;
    let body = MessageRes {
        message: "You have been logged out.".into(),
    };
    Ok(([(SET_COOKIE, clear_session_cookie())], Json(body)))
}

#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Role-specific statistics and upcoming events", body = DashboardRes),
        (status = 401, description = "Not logged in", body = ErrorRes)
    )
)]
/// Dashboard for the logged-in account
///
/// Counters depend on the caller's role; every role receives up to five upcoming events.
#[axum::debug_handler]
pub async fn dashboard(
    State(state): State<AppState>,
    Session(ctx): Session,
) -> ApiResult<Json<DashboardRes>> {
    let res = DashboardService::new(state.cfg.clone()).dashboard(&ctx)?;
    Ok(Json(res))
}

#[utoipa::path(
    get,
    path = "/users",
    params(ListAccountsQuery),
    responses(
        (status = 200, description = "Accounts, newest first", body = ListAccountsRes),
        (status = 403, description = "Not an administrator", body = ErrorRes)
    )
)]
/// List accounts (administrators only)
#[axum::debug_handler]
pub async fn list_users(
    State(state): State<AppState>,
    Session(ctx): Session,
    Query(query): Query<ListAccountsQuery>,
) -> ApiResult<Json<ListAccountsRes>> {
    let role = match query.role.as_deref().filter(|r| !r.is_empty() && *r != "all") {
        Some(r) => {
            Some(Role::from_wire(r).ok_or_else(|| RecordError::field("role", NOT_A_CHOICE))?)
        }
        None => None,
    };
    let accounts = AccountService::new(state.cfg.clone())
        .list(&ctx, role, query.include_inactive)?
        .iter()
        .map(AccountRes::from)
        .collect();
    Ok(Json(ListAccountsRes { accounts }))
}

#[utoipa::path(
    post,
    path = "/users/{id}/toggle_status",
    params(("id" = String, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account activated or deactivated", body = AccountRes),
        (status = 403, description = "Not an administrator", body = ErrorRes),
        (status = 404, description = "Account not found", body = ErrorRes)
    )
)]
/// Activate or deactivate an account (administrators only)
///
/// A deactivated account can no longer log in, and its existing sessions stop authenticating.
#[axum::debug_handler]
pub async fn toggle_user_status(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(id): Path<String>,
) -> ApiResult<Json<AccountRes>> {
    ctx.actor()?.authorize(Operation::ManageAccounts)?;
    let id = ShardableUuid::parse(&id).map_err(|_| RecordError::NotFound("account"))?;
    let account = AccountService::new(state.cfg.clone()).toggle_active(&ctx, &id)?;
    Ok(Json(AccountRes::from(&account)))
}

#[utoipa::path(
    get,
    path = "/audit",
    params(AuditQuery),
    responses(
        (status = 200, description = "Most recent audit entries, newest first", body = ListAuditRes),
        (status = 403, description = "Not an administrator", body = ErrorRes)
    )
)]
/// Recent audit trail entries (administrators only)
#[axum::debug_handler]
pub async fn audit_trail(
    State(state): State<AppState>,
    Session(ctx): Session,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<ListAuditRes>> {
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
    let entries = AuditService::new(state.cfg.clone())
        .list(&ctx, limit)?
        .into_iter()
        .map(AuditEntryRes::from)
        .collect();
    Ok(Json(ListAuditRes { entries }))
}
