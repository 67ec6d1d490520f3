//! API routes for the subscription surface.
//!
//! The authenticated subscription routes and the signature-authenticated
//! webhook route are assembled here. The CRUD layer mounts its own routers
//! next to this one and reuses [`super::access_gate::PaidAccess`] for
//! billing-gated actions.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::application::handlers::subscription::{
    CancelOutcome, CancelSubscriptionCommand, CancelSubscriptionHandler, CheckAccessHandler,
    CheckAccessQuery, CheckoutRedirect, CreatePortalSessionCommand, CreatePortalSessionHandler,
    HandleBillingWebhookHandler, InitializeTrialCommand, InitializeTrialHandler,
    StartCheckoutCommand, StartCheckoutHandler,
};
use crate::application::SubscriptionGuard;
use crate::domain::foundation::Timestamp;
use crate::domain::subscription::AccessReport;
use crate::ports::PortalSession;

use super::auth::{AuthenticatedAccount, TokenVerifier};
use super::error::ApiError;
use super::webhook;

/// Shared handler wiring for the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub initialize_trial: Arc<InitializeTrialHandler>,
    pub start_checkout: Arc<StartCheckoutHandler>,
    pub create_portal: Arc<CreatePortalSessionHandler>,
    pub cancel: Arc<CancelSubscriptionHandler>,
    pub check_access: Arc<CheckAccessHandler>,
    pub webhook: Arc<HandleBillingWebhookHandler>,
    pub guard: Arc<SubscriptionGuard>,
    pub auth: Arc<TokenVerifier>,
}

/// Builds the router for the subscription engine.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/subscription", get(subscription_status))
        .route("/api/subscription/trial", post(initialize_trial))
        .route("/api/subscription/checkout", post(start_checkout))
        .route("/api/subscription/portal", post(create_portal))
        .route("/api/subscription/cancel", post(cancel_subscription))
        // Signature-authenticated; intentionally outside the bearer gate.
        .route("/webhooks/billing", post(webhook::handle))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn subscription_status(
    State(state): State<AppState>,
    AuthenticatedAccount(account_id): AuthenticatedAccount,
) -> Result<Json<AccessReport>, ApiError> {
    let report = state
        .check_access
        .handle(CheckAccessQuery { account_id })
        .await?;
    Ok(Json(report))
}

async fn initialize_trial(
    State(state): State<AppState>,
    AuthenticatedAccount(account_id): AuthenticatedAccount,
) -> Result<(StatusCode, Json<AccessReport>), ApiError> {
    let record = state
        .initialize_trial
        .handle(InitializeTrialCommand { account_id })
        .await?;
    let report = AccessReport::evaluate(&record, Timestamp::now());
    Ok((StatusCode::CREATED, Json(report)))
}

#[derive(Debug, Deserialize)]
struct CheckoutBody {
    email: String,
    success_url: String,
    cancel_url: String,
}

async fn start_checkout(
    State(state): State<AppState>,
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    Json(body): Json<CheckoutBody>,
) -> Result<Json<CheckoutRedirect>, ApiError> {
    let redirect = state
        .start_checkout
        .handle(StartCheckoutCommand {
            account_id,
            email: body.email,
            success_url: body.success_url,
            cancel_url: body.cancel_url,
        })
        .await?;
    Ok(Json(redirect))
}

#[derive(Debug, Deserialize)]
struct PortalBody {
    return_url: String,
}

async fn create_portal(
    State(state): State<AppState>,
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    Json(body): Json<PortalBody>,
) -> Result<Json<PortalSession>, ApiError> {
    let session = state
        .create_portal
        .handle(CreatePortalSessionCommand {
            account_id,
            return_url: body.return_url,
        })
        .await?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
struct CancelBody {
    #[serde(default)]
    immediate: bool,
    reason: Option<String>,
}

async fn cancel_subscription(
    State(state): State<AppState>,
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    Json(body): Json<CancelBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state
        .cancel
        .handle(CancelSubscriptionCommand {
            account_id,
            immediate: body.immediate,
            reason: body.reason,
        })
        .await?;
    let status = match outcome {
        CancelOutcome::CancelledNow => "cancelled",
        CancelOutcome::CancelsAtPeriodEnd => "cancels_at_period_end",
    };
    Ok(Json(serde_json::json!({ "status": status })))
}
