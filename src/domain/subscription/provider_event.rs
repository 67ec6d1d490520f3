//! Billing provider event model.
//!
//! Inbound webhook payloads arrive as a generic envelope whose `type` field
//! selects the shape of the nested object. This module parses the envelope
//! into a tagged union with one strongly-typed variant per event kind, so the
//! reconciliation engine dispatches on the enum instead of inspecting raw
//! JSON. Unknown kinds are preserved, not rejected: the provider adds event
//! types over time and replaying them must stay a no-op.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AccountId, Timestamp};

/// Metadata key under which checkout sessions carry the local account id.
///
/// This is the tertiary identity-resolution key: it exists so a webhook that
/// arrives before the provider subscription id is known locally can still be
/// matched.
pub const ACCOUNT_METADATA_KEY: &str = "account_id";

/// Raw webhook envelope as delivered by the provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEventEnvelope {
    /// Provider's event id (informational; delivery is at-least-once and
    /// payloads for the same logical event can repeat, so this is never used
    /// for deduplication).
    pub id: String,

    /// Event kind, e.g. "checkout.session.completed".
    #[serde(rename = "type")]
    pub kind: String,

    /// Unix timestamp at which the provider created the event.
    pub created: i64,

    /// Whether this is a live mode event.
    #[serde(default)]
    pub livemode: bool,

    /// Container for the event-specific object.
    pub data: ProviderEventData,
}

/// Container for the polymorphic event object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderEventData {
    pub object: serde_json::Value,
}

/// Subscription status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Unpaid,
    Incomplete,
    IncompleteExpired,
    Paused,
    Unknown,
}

impl ProviderSubscriptionStatus {
    /// Parses the provider's status string; anything unrecognized maps to
    /// `Unknown` rather than failing.
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "past_due" => Self::PastDue,
            "canceled" => Self::Canceled,
            "unpaid" => Self::Unpaid,
            "incomplete" => Self::Incomplete,
            "incomplete_expired" => Self::IncompleteExpired,
            "paused" => Self::Paused,
            _ => Self::Unknown,
        }
    }
}

/// Facts extracted from a completed checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutFacts {
    pub session_id: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub account_id: Option<AccountId>,
    /// Total charged, in minor units.
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    /// Paid-period end when the provider inlines it on the session.
    pub period_end: Option<Timestamp>,
}

/// Facts extracted from a provider subscription object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFacts {
    pub subscription_id: String,
    pub customer_id: Option<String>,
    pub account_id: Option<AccountId>,
    pub status: ProviderSubscriptionStatus,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
}

/// Facts extracted from an invoice object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceFacts {
    pub invoice_id: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub account_id: Option<AccountId>,
    /// Amount actually paid, in minor units.
    pub amount_paid: Option<i64>,
    pub currency: Option<String>,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
}

/// Provider notification, one variant per transition-table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    CheckoutCompleted(CheckoutFacts),
    SubscriptionUpdated(SubscriptionFacts),
    SubscriptionDeleted(SubscriptionFacts),
    InvoicePaymentSucceeded(InvoiceFacts),
    InvoicePaymentFailed(InvoiceFacts),
    TrialWillEnd(SubscriptionFacts),
    /// Recognized envelope, unrecognized kind. Logged and ignored.
    Unknown { kind: String },
}

impl BillingEvent {
    /// Short name for logging.
    pub fn kind(&self) -> &str {
        match self {
            Self::CheckoutCompleted(_) => "checkout.session.completed",
            Self::SubscriptionUpdated(_) => "customer.subscription.updated",
            Self::SubscriptionDeleted(_) => "customer.subscription.deleted",
            Self::InvoicePaymentSucceeded(_) => "invoice.payment_succeeded",
            Self::InvoicePaymentFailed(_) => "invoice.payment_failed",
            Self::TrialWillEnd(_) => "customer.subscription.trial_will_end",
            Self::Unknown { kind } => kind,
        }
    }

    /// Provider subscription id carried by the event, if any.
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            Self::CheckoutCompleted(f) => f.subscription_id.as_deref(),
            Self::SubscriptionUpdated(f) | Self::SubscriptionDeleted(f) | Self::TrialWillEnd(f) => {
                Some(f.subscription_id.as_str())
            }
            Self::InvoicePaymentSucceeded(f) | Self::InvoicePaymentFailed(f) => {
                f.subscription_id.as_deref()
            }
            Self::Unknown { .. } => None,
        }
    }

    /// Provider customer id carried by the event, if any.
    pub fn customer_id(&self) -> Option<&str> {
        match self {
            Self::CheckoutCompleted(f) => f.customer_id.as_deref(),
            Self::SubscriptionUpdated(f) | Self::SubscriptionDeleted(f) | Self::TrialWillEnd(f) => {
                f.customer_id.as_deref()
            }
            Self::InvoicePaymentSucceeded(f) | Self::InvoicePaymentFailed(f) => {
                f.customer_id.as_deref()
            }
            Self::Unknown { .. } => None,
        }
    }

    /// Local account id carried in provider-visible metadata, if any.
    pub fn account_id(&self) -> Option<&AccountId> {
        match self {
            Self::CheckoutCompleted(f) => f.account_id.as_ref(),
            Self::SubscriptionUpdated(f) | Self::SubscriptionDeleted(f) | Self::TrialWillEnd(f) => {
                f.account_id.as_ref()
            }
            Self::InvoicePaymentSucceeded(f) | Self::InvoicePaymentFailed(f) => {
                f.account_id.as_ref()
            }
            Self::Unknown { .. } => None,
        }
    }

    /// Converts an envelope into a typed event.
    ///
    /// Fails only when the object does not deserialize for a *recognized*
    /// kind; unknown kinds always succeed as [`BillingEvent::Unknown`].
    pub fn from_envelope(envelope: &ProviderEventEnvelope) -> Result<Self, serde_json::Error> {
        let object = &envelope.data.object;
        let event = match envelope.kind.as_str() {
            "checkout.session.completed" => {
                let raw: RawCheckoutSession = serde_json::from_value(object.clone())?;
                Self::CheckoutCompleted(raw.into())
            }
            "customer.subscription.created" | "customer.subscription.updated" => {
                let raw: RawSubscription = serde_json::from_value(object.clone())?;
                Self::SubscriptionUpdated(raw.into())
            }
            "customer.subscription.deleted" => {
                let raw: RawSubscription = serde_json::from_value(object.clone())?;
                Self::SubscriptionDeleted(raw.into())
            }
            "invoice.payment_succeeded" | "invoice.paid" => {
                let raw: RawInvoice = serde_json::from_value(object.clone())?;
                Self::InvoicePaymentSucceeded(raw.into())
            }
            "invoice.payment_failed" => {
                let raw: RawInvoice = serde_json::from_value(object.clone())?;
                Self::InvoicePaymentFailed(raw.into())
            }
            "customer.subscription.trial_will_end" => {
                let raw: RawSubscription = serde_json::from_value(object.clone())?;
                Self::TrialWillEnd(raw.into())
            }
            other => Self::Unknown {
                kind: other.to_string(),
            },
        };
        Ok(event)
    }
}

fn account_from_metadata(metadata: &HashMap<String, String>) -> Option<AccountId> {
    metadata
        .get(ACCOUNT_METADATA_KEY)
        .and_then(|v| AccountId::new(v.clone()).ok())
}

/// Wire shape of a checkout session object. Only fields we read.
#[derive(Debug, Deserialize)]
struct RawCheckoutSession {
    id: String,
    customer: Option<String>,
    subscription: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    current_period_end: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl From<RawCheckoutSession> for CheckoutFacts {
    fn from(raw: RawCheckoutSession) -> Self {
        let account_id = account_from_metadata(&raw.metadata);
        Self {
            session_id: raw.id,
            customer_id: raw.customer,
            subscription_id: raw.subscription,
            account_id,
            amount_total: raw.amount_total,
            currency: raw.currency,
            period_end: raw.current_period_end.and_then(Timestamp::from_unix_secs),
        }
    }
}

/// Wire shape of a subscription object. Only fields we read.
#[derive(Debug, Deserialize)]
struct RawSubscription {
    id: String,
    customer: Option<String>,
    status: Option<String>,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: bool,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl From<RawSubscription> for SubscriptionFacts {
    fn from(raw: RawSubscription) -> Self {
        let account_id = account_from_metadata(&raw.metadata);
        Self {
            subscription_id: raw.id,
            customer_id: raw.customer,
            account_id,
            status: raw
                .status
                .as_deref()
                .map(ProviderSubscriptionStatus::parse)
                .unwrap_or(ProviderSubscriptionStatus::Unknown),
            period_start: raw.current_period_start.and_then(Timestamp::from_unix_secs),
            period_end: raw.current_period_end.and_then(Timestamp::from_unix_secs),
            cancel_at_period_end: raw.cancel_at_period_end,
        }
    }
}

/// Wire shape of an invoice object. Only fields we read.
#[derive(Debug, Deserialize)]
struct RawInvoice {
    id: String,
    customer: Option<String>,
    subscription: Option<String>,
    amount_paid: Option<i64>,
    currency: Option<String>,
    period_start: Option<i64>,
    period_end: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl From<RawInvoice> for InvoiceFacts {
    fn from(raw: RawInvoice) -> Self {
        let account_id = account_from_metadata(&raw.metadata);
        Self {
            invoice_id: raw.id,
            customer_id: raw.customer,
            subscription_id: raw.subscription,
            account_id,
            amount_paid: raw.amount_paid,
            currency: raw.currency,
            period_start: raw.period_start.and_then(Timestamp::from_unix_secs),
            period_end: raw.period_end.and_then(Timestamp::from_unix_secs),
        }
    }
}
