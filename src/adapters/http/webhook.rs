//! Inbound billing webhook route.
//!
//! Mounted outside the authenticated router group: deliveries authenticate
//! via payload signature, not session tokens. Every recognized delivery is
//! acknowledged with 200 regardless of what applying it did; only signature
//! and payload failures reject.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::application::handlers::subscription::HandleBillingWebhookCommand;

use super::routes::AppState;

/// Header carrying the provider's delivery signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing signature header" })),
        )
            .into_response();
    };

    match state
        .webhook
        .handle(HandleBillingWebhookCommand {
            payload: body.to_vec(),
            signature,
        })
        .await
    {
        Ok(_) => (StatusCode::OK, Json(json!({ "received": true }))).into_response(),
        Err(e) => (e.status_code(), Json(json!({ "error": e.to_string() }))).into_response(),
    }
}
