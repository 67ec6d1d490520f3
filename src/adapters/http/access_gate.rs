//! Request-time paid-access gate.
//!
//! The prescription-creation route (and any other billing-gated action in
//! the CRUD layer) extracts [`PaidAccess`] instead of plain
//! [`AuthenticatedAccount`]: authentication and the subscription check run
//! together, and a lapsed subscription answers with a distinct
//! `402 Payment Required` body the client keys on.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::domain::foundation::AccountId;

use super::auth::AuthenticatedAccount;
use super::error::ApiError;
use super::routes::AppState;

/// Extractor asserting the caller has an active trial or paid subscription.
#[derive(Debug, Clone)]
pub struct PaidAccess(pub AccountId);

#[axum::async_trait]
impl FromRequestParts<AppState> for PaidAccess {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthenticatedAccount(account_id) =
            AuthenticatedAccount::from_request_parts(parts, state).await?;

        state.guard.ensure_active(&account_id).await?;
        Ok(PaidAccess(account_id))
    }
}
