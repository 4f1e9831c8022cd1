//! Mapping of core errors onto HTTP responses.
//!
//! Client-facing messages are fixed strings; storage, git and gateway details only reach the
//! server log.

use api_shared::ErrorRes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chs_core::RecordError;

pub const PAYMENT_FAILED: &str = "Error initiating payment. Please try again.";
const INTERNAL: &str = "Internal error";

#[derive(Debug)]
pub enum ApiError {
    Record(RecordError),
    /// A failure outside the core, e.g. a panicked blocking task.
    Internal(String),
}

impl From<RecordError> for ApiError {
    fn from(e: RecordError) -> Self {
        ApiError::Record(e)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("blocking task failed: {e}"))
    }
}

impl ApiError {
    fn status_and_body(self) -> (StatusCode, ErrorRes) {
        let e = match self {
            ApiError::Record(e) => e,
            ApiError::Internal(detail) => {
                tracing::error!("{}", detail);
                return (StatusCode::INTERNAL_SERVER_ERROR, ErrorRes::message(INTERNAL));
            }
        };

        match e {
            RecordError::Validation(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorRes {
                    error: "Please correct the errors below.".into(),
                    fields: Some(fields.into_map()),
                },
            ),
            RecordError::AccessDenied => (StatusCode::FORBIDDEN, ErrorRes::message(e.to_string())),
            RecordError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                ErrorRes::message("Please log in to access this page."),
            ),
            RecordError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, ErrorRes::message(e.to_string()))
            }
            RecordError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorRes::message(e.to_string())),
            RecordError::Duplicate(_)
            | RecordError::AlreadyRecorded
            | RecordError::EventFull
            | RecordError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, ErrorRes::message(e.to_string()))
            }
            RecordError::InvalidInput(_) => {
                (StatusCode::BAD_REQUEST, ErrorRes::message(e.to_string()))
            }
            RecordError::Gateway(detail) => {
                tracing::error!("payment gateway: {}", detail);
                (StatusCode::BAD_GATEWAY, ErrorRes::message(PAYMENT_FAILED))
            }
            other => {
                tracing::error!("request failed: {:?}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorRes::message(INTERNAL))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chs_core::FieldErrors;

    fn status(e: RecordError) -> StatusCode {
        ApiError::from(e).status_and_body().0
    }

    #[test]
    fn record_errors_map_to_statuses() {
        assert_eq!(status(RecordError::AccessDenied), StatusCode::FORBIDDEN);
        assert_eq!(status(RecordError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status(RecordError::NotFound("patient")), StatusCode::NOT_FOUND);
        assert_eq!(status(RecordError::AlreadyRecorded), StatusCode::CONFLICT);
        assert_eq!(status(RecordError::EventFull), StatusCode::CONFLICT);
        assert_eq!(
            status(RecordError::Gateway("HTTP 500".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(RecordError::ReferenceExhausted("payment reference")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn gateway_detail_is_not_exposed() {
        let (_, body) =
            ApiError::from(RecordError::Gateway("secret upstream body".into())).status_and_body();
        assert_eq!(body.error, PAYMENT_FAILED);
    }

    #[test]
    fn validation_carries_fields() {
        let mut fields = FieldErrors::default();
        fields.add("amount", "Number must be at least 1.");
        let (status, body) = ApiError::from(RecordError::Validation(fields)).status_and_body();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body.fields.unwrap()["amount"],
            vec!["Number must be at least 1.".to_string()]
        );
    }
}
