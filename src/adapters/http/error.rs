//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Domain error carried across the HTTP boundary.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.code {
            ErrorCode::ValidationFailed | ErrorCode::InvalidFormat => StatusCode::BAD_REQUEST,
            ErrorCode::SubscriptionNotFound | ErrorCode::AccountNotFound => StatusCode::NOT_FOUND,
            ErrorCode::TrialAlreadyUsed | ErrorCode::ConcurrencyConflict => StatusCode::CONFLICT,
            ErrorCode::InvalidStateTransition => StatusCode::CONFLICT,
            // Access denials on billing grounds get the distinct 402 the
            // gating collaborators key on.
            ErrorCode::SubscriptionExpired | ErrorCode::PaymentRequired => {
                StatusCode::PAYMENT_REQUIRED
            }
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::ExternalServiceError => StatusCode::BAD_GATEWAY,
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": {
                "code": self.0.code.to_string(),
                "message": self.0.message,
            }
        }));
        (status, body).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}
