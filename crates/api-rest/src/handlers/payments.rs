use crate::error::ApiResult;
use crate::session::{Origin, PublicBaseUrl, Session};
use crate::AppState;
use api_shared::{
    ErrorRes, InitiatePaymentRes, ListPaymentsQuery, ListPaymentsRes, PaymentReq, PaymentRes,
    WebhookAck,
};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chs_core::{
    verify_webhook_signature, CheckoutUrls, PaymentFilter, PaymentService, RequestContext,
};
use serde_json::Value;

/// Header carrying the hex HMAC-SHA256 of the raw webhook body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[utoipa::path(
    get,
    path = "/payments",
    params(ListPaymentsQuery),
    responses(
        (status = 200, description = "Payments visible to the caller, newest first", body = ListPaymentsRes),
        (status = 422, description = "Unknown type or status filter", body = ErrorRes)
    )
)]
/// List payments
///
/// Administrators see every payment; other roles see payments they made or receive.
#[axum::debug_handler]
pub async fn list_payments(
    State(state): State<AppState>,
    Session(ctx): Session,
    Query(query): Query<ListPaymentsQuery>,
) -> ApiResult<Json<ListPaymentsRes>> {
    let filter = PaymentFilter {
        payment_type: query.payment_type.as_deref(),
        status: query.status.as_deref(),
    };
    let payments = PaymentService::new(state.cfg.clone())
        .list(&ctx, &filter)?
        .iter()
        .map(PaymentRes::from)
        .collect();
    Ok(Json(ListPaymentsRes { payments }))
}

#[utoipa::path(
    post,
    path = "/payments",
    request_body = PaymentReq,
    responses(
        (status = 303, description = "Pending payment stored; Location is the hosted checkout page", body = InitiatePaymentRes),
        (status = 422, description = "Validation failed", body = ErrorRes),
        (status = 502, description = "The gateway did not create a checkout", body = ErrorRes)
    )
)]
/// Initiate an M-Pesa payment through a hosted checkout
///
/// Stores a `pending` payment and redirects the payer to the gateway's checkout page. The
/// gateway call blocks, so the whole initiation runs on the blocking pool.
///
/// # Errors
/// Returns `502 Bad Gateway` with a generic message if the gateway rejects the request or
/// cannot be reached. Nothing is stored in that case.
#[axum::debug_handler]
pub async fn initiate_payment(
    State(state): State<AppState>,
    Session(ctx): Session,
    PublicBaseUrl(base_url): PublicBaseUrl,
    Json(req): Json<PaymentReq>,
) -> ApiResult<Response> {
    let urls = CheckoutUrls::for_origin(&base_url);
    let cfg = state.cfg.clone();
    let gateway = state.gateway.clone();

    let payment = tokio::task::spawn_blocking(move || {
        PaymentService::new(cfg).initiate(&ctx, &req, gateway.as_ref(), &urls)
    })
    .await??;

    let body = InitiatePaymentRes {
        checkout_url: payment.checkout_url.clone(),
        payment: PaymentRes::from(&payment),
    };
    Ok((
        StatusCode::SEE_OTHER,
        [(LOCATION, payment.checkout_url.clone())],
        Json(body),
    )
        .into_response())
}

/// A non-empty string field of the callback; any other JSON value counts as absent.
fn text_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|v| !v.trim().is_empty())
}

#[utoipa::path(
    post,
    path = "/webhooks/intasend",
    request_body = String,
    params(("X-Webhook-Signature" = String, Header, description = "Hex HMAC-SHA256 of the raw body")),
    responses(
        (status = 200, description = "Callback acknowledged", body = WebhookAck),
        (status = 400, description = "Unparseable body or storage failure", body = WebhookAck),
        (status = 401, description = "Missing or invalid signature", body = WebhookAck)
    )
)]
/// Payment gateway callback
///
/// Authenticated by signature rather than session. Callbacks for unknown checkouts, and
/// bodies without a string invoice id or state, are acknowledged without changing anything.
#[axum::debug_handler]
pub async fn intasend_webhook(
    State(state): State<AppState>,
    Origin(origin): Origin,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<WebhookAck>) {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_webhook_signature(&state.webhook_secret, &body, signature) {
        tracing::warn!("rejected webhook with a missing or invalid signature");
        return (StatusCode::UNAUTHORIZED, Json(WebhookAck::error()));
    }

    let callback: Value = match serde_json::from_slice(&body) {
        Ok(callback) => callback,
        Err(e) => {
            tracing::warn!("unparseable webhook body: {}", e);
            return (StatusCode::BAD_REQUEST, Json(WebhookAck::error()));
        }
    };
    let (Some(invoice_id), Some(gateway_state)) = (
        text_field(&callback, "invoice_id"),
        text_field(&callback, "state"),
    ) else {
        return (StatusCode::OK, Json(WebhookAck::success()));
    };

    let ctx = RequestContext::anonymous(origin);
    match PaymentService::new(state.cfg.clone()).reconcile(&ctx, invoice_id, gateway_state) {
        Ok(_) => (StatusCode::OK, Json(WebhookAck::success())),
        Err(e) => {
            tracing::error!("webhook for {} failed: {:?}", invoice_id, e);
            (StatusCode::BAD_REQUEST, Json(WebhookAck::error()))
        }
    }
}
