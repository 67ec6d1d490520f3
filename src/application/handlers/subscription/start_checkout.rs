//! StartCheckoutHandler - opens a provider checkout session for the paid
//! plan.
//!
//! The only component allowed to *initiate* a provider identifier: a missing
//! provider customer is created and persisted before the session is built.
//! The account id rides along as provider-visible metadata so later webhooks
//! can resolve the record even before the subscription id is known locally.

use std::sync::Arc;

use tracing::info;

use crate::domain::foundation::{AccountId, DomainError, SubscriptionId, Timestamp};
use crate::domain::subscription::SubscriptionRecord;
use crate::ports::{BillingProvider, CheckoutSessionRequest, SubscriptionStore};

/// Command to start a checkout for an account.
#[derive(Debug, Clone)]
pub struct StartCheckoutCommand {
    pub account_id: AccountId,
    /// Billing email for the provider customer, used only on first contact.
    pub email: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Where to send the account holder.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CheckoutRedirect {
    pub session_id: String,
    pub url: String,
    /// Client-usable publishable key.
    pub publishable_key: String,
}

/// Handler for checkout orchestration.
pub struct StartCheckoutHandler {
    store: Arc<dyn SubscriptionStore>,
    provider: Arc<dyn BillingProvider>,
    publishable_key: String,
}

impl StartCheckoutHandler {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        provider: Arc<dyn BillingProvider>,
        publishable_key: String,
    ) -> Self {
        Self {
            store,
            provider,
            publishable_key,
        }
    }

    pub async fn handle(&self, cmd: StartCheckoutCommand) -> Result<CheckoutRedirect, DomainError> {
        let now = Timestamp::now();

        // A record must exist before the provider learns about the account.
        let record = match self.store.find_by_account_id(&cmd.account_id).await? {
            Some(record) => record,
            None => {
                let record =
                    SubscriptionRecord::pending(SubscriptionId::new(), cmd.account_id.clone(), now);
                self.store.insert(&record).await?;
                record
            }
        };

        let customer_id = self.ensure_provider_customer(record, &cmd.email, now).await?;

        let session = self
            .provider
            .create_checkout_session(CheckoutSessionRequest {
                customer_id,
                account_id: cmd.account_id.clone(),
                success_url: cmd.success_url,
                cancel_url: cmd.cancel_url,
            })
            .await?;

        info!(account_id = %cmd.account_id, session_id = %session.id, "Checkout session created");

        Ok(CheckoutRedirect {
            session_id: session.id,
            url: session.url,
            publishable_key: self.publishable_key.clone(),
        })
    }

    /// Creates the provider customer iff the record has none, persisting the
    /// id before continuing. Idempotent: a retried call with a populated
    /// record returns the existing id without touching the provider.
    async fn ensure_provider_customer(
        &self,
        mut record: SubscriptionRecord,
        email: &str,
        now: Timestamp,
    ) -> Result<String, DomainError> {
        if let Some(existing) = record.provider_customer_id.clone() {
            return Ok(existing);
        }

        let customer = self
            .provider
            .create_customer(&record.account_id, email)
            .await?;

        record.fill_provider_customer_id(&customer.id);
        record.touch(now);
        self.store.update(&record).await?;

        Ok(customer.id)
    }
}
