//! Subscription domain - lifecycle state, access evaluation, and the
//! billing-reconciliation engine.

pub mod access;
mod plan;
mod provider_event;
mod reconcile;
mod record;
mod status;
mod webhook_errors;
mod webhook_verifier;

pub use access::AccessReport;
pub use plan::Plan;
pub use provider_event::{
    BillingEvent, CheckoutFacts, InvoiceFacts, ProviderEventEnvelope, ProviderSubscriptionStatus,
    SubscriptionFacts, ACCOUNT_METADATA_KEY,
};
pub use reconcile::{merge, ReconcileOutcome, ReconciliationEngine};
pub use record::SubscriptionRecord;
pub use status::SubscriptionStatus;
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{SignatureHeader, WebhookVerifier};

#[cfg(test)]
pub use webhook_verifier::sign_for_tests;
