//! Wire types for the Stripe API.
//!
//! Only the fields we read are modeled; everything else in the provider's
//! responses is ignored.

use serde::Deserialize;

use crate::domain::subscription::ProviderSubscriptionStatus;
use crate::ports::{Price, ProviderCustomer, ProviderSubscription};

#[derive(Debug, Deserialize)]
pub(super) struct StripeCustomer {
    pub id: String,
    pub email: Option<String>,
}

impl From<StripeCustomer> for ProviderCustomer {
    fn from(raw: StripeCustomer) -> Self {
        Self {
            id: raw.id,
            email: raw.email,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct StripeCheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StripePortalSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct StripeSubscription {
    pub id: String,
    pub customer: String,
    pub status: String,
    pub current_period_start: Option<i64>,
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

impl From<StripeSubscription> for ProviderSubscription {
    fn from(raw: StripeSubscription) -> Self {
        Self {
            id: raw.id,
            customer_id: raw.customer,
            status: ProviderSubscriptionStatus::parse(&raw.status),
            current_period_start: raw.current_period_start,
            current_period_end: raw.current_period_end,
            cancel_at_period_end: raw.cancel_at_period_end,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct StripePrice {
    pub id: String,
    pub unit_amount: Option<i64>,
    pub currency: String,
}

impl From<StripePrice> for Price {
    fn from(raw: StripePrice) -> Self {
        Self {
            id: raw.id,
            unit_amount: raw.unit_amount,
            currency: raw.currency,
        }
    }
}

/// Error envelope Stripe wraps around non-2xx responses.
#[derive(Debug, Deserialize)]
pub(super) struct StripeErrorEnvelope {
    pub error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
pub(super) struct StripeErrorBody {
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
}
