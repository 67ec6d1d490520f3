//! Billing provider port.
//!
//! Contract for the external payment service of record. The provider owns
//! charge truth; this port only creates sessions and reads back authoritative
//! objects. The adapter holds its own credentials as an explicitly
//! constructed instance; there is no process-wide API-key state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::AccountId;
use crate::domain::subscription::ProviderSubscriptionStatus;

/// Port for the billing provider's API.
///
/// All calls are synchronous request/response with a finite timeout; none of
/// them may be retried blindly except customer creation, which is idempotent
/// on our side (the orchestrator checks for an existing id first).
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Creates a customer, tagging it with the local account id.
    async fn create_customer(
        &self,
        account_id: &AccountId,
        email: &str,
    ) -> Result<ProviderCustomer, BillingError>;

    /// Creates a checkout session for the paid plan.
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, BillingError>;

    /// Creates a self-service billing portal session.
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, BillingError>;

    /// Retrieves an authoritative subscription object.
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, BillingError>;

    /// Cancels a subscription.
    ///
    /// With `at_period_end`, the provider keeps the subscription active until
    /// the paid period ends and later emits a deletion event; otherwise it is
    /// ended immediately.
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<ProviderSubscription, BillingError>;

    /// Retrieves the configured paid-plan price.
    async fn get_price(&self) -> Result<Price, BillingError>;
}

/// Customer as known to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCustomer {
    pub id: String,
    pub email: Option<String>,
}

/// Request to open a checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    /// Provider customer the session is for.
    pub customer_id: String,
    /// Local account id, attached as provider-visible metadata. This is the
    /// tertiary identity-resolution key for webhooks that arrive before the
    /// provider subscription id is known locally.
    pub account_id: AccountId,
    pub success_url: String,
    pub cancel_url: String,
}

/// Checkout session the account holder is redirected to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Billing portal session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalSession {
    pub id: String,
    pub url: String,
}

/// Authoritative subscription object read back from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSubscription {
    pub id: String,
    pub customer_id: String,
    pub status: ProviderSubscriptionStatus,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: bool,
}

/// Price of the paid plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Price {
    pub id: String,
    /// Unit amount in minor units.
    pub unit_amount: Option<i64>,
    pub currency: String,
}

/// Failure of a provider call, surfaced typed to the caller.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct BillingError {
    pub code: BillingErrorCode,
    /// Provider's own message, passed through for the caller.
    pub message: String,
    pub retryable: bool,
}

impl BillingError {
    pub fn new(code: BillingErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BillingErrorCode::Network, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(BillingErrorCode::Api, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(BillingErrorCode::NotFound, format!("{} not found", resource))
    }
}

/// Coarse categories of provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingErrorCode {
    /// Connectivity or timeout.
    Network,
    /// Authentication with the provider failed.
    Authentication,
    /// Provider rate limit.
    RateLimited,
    /// Referenced object does not exist at the provider.
    NotFound,
    /// Any other provider-side error.
    Api,
}

impl BillingErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BillingErrorCode::Network | BillingErrorCode::RateLimited)
    }
}

impl std::fmt::Display for BillingErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BillingErrorCode::Network => "network",
            BillingErrorCode::Authentication => "authentication",
            BillingErrorCode::RateLimited => "rate_limited",
            BillingErrorCode::NotFound => "not_found",
            BillingErrorCode::Api => "api",
        };
        write!(f, "{}", s)
    }
}

impl From<BillingError> for crate::domain::foundation::DomainError {
    fn from(err: BillingError) -> Self {
        use crate::domain::foundation::{DomainError, ErrorCode};
        DomainError::new(ErrorCode::ExternalServiceError, err.message)
            .with_detail("provider_code", err.code.to_string())
    }
}
