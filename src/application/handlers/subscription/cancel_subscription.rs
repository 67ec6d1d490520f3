//! CancelSubscriptionHandler - immediate and deferred cancellation.
//!
//! Two deliberately different paths:
//!
//! - **Immediate**: the provider cancel call runs first; only after it
//!   succeeds is the local record set to Cancelled, so the UI reflects the
//!   cancellation synchronously and a provider failure leaves nothing
//!   half-done.
//! - **Deferred**: cancel-at-period-end is flagged with the provider and the
//!   reason recorded locally; status stays untouched until the provider's
//!   "subscription deleted" event arrives and the reconciliation engine
//!   finalizes it. The account keeps access for the period it paid for.

use std::sync::Arc;

use tracing::info;

use crate::domain::foundation::{AccountId, DomainError, ErrorCode, Timestamp};
use crate::domain::subscription::{SubscriptionRecord, SubscriptionStatus};
use crate::ports::{BillingProvider, SubscriptionStore};

/// Command to cancel an account's subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub account_id: AccountId,
    /// True cancels now; false at the end of the paid period.
    pub immediate: bool,
    pub reason: Option<String>,
}

/// What the cancellation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Status is Cancelled as of now.
    CancelledNow,
    /// Provider will end the subscription at period end; status unchanged.
    CancelsAtPeriodEnd,
}

/// Handler for subscription cancellation.
pub struct CancelSubscriptionHandler {
    store: Arc<dyn SubscriptionStore>,
    provider: Arc<dyn BillingProvider>,
}

impl CancelSubscriptionHandler {
    pub fn new(store: Arc<dyn SubscriptionStore>, provider: Arc<dyn BillingProvider>) -> Self {
        Self { store, provider }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelOutcome, DomainError> {
        let now = Timestamp::now();
        let mut record = self
            .store
            .find_by_account_id(&cmd.account_id)
            .await?
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    "Account has no subscription record",
                )
            })?;

        match record.provider_subscription_id.clone() {
            Some(subscription_id) if !cmd.immediate => {
                self.provider
                    .cancel_subscription(&subscription_id, true)
                    .await?;

                // Reason only; the deletion event finalizes the status.
                if record.cancellation_reason.is_none() {
                    record.cancellation_reason = cmd.reason;
                    record.touch(now);
                    self.store.update(&record).await?;
                }
                info!(account_id = %cmd.account_id, "Cancellation scheduled at period end");
                Ok(CancelOutcome::CancelsAtPeriodEnd)
            }
            Some(subscription_id) => {
                self.provider
                    .cancel_subscription(&subscription_id, false)
                    .await?;
                self.cancel_locally(&mut record, now, cmd.reason.as_deref())
                    .await?;
                info!(account_id = %cmd.account_id, "Subscription cancelled immediately");
                Ok(CancelOutcome::CancelledNow)
            }
            None => {
                // Nothing exists at the provider; a trial or pending record
                // cancels locally regardless of the requested mode.
                self.cancel_locally(&mut record, now, cmd.reason.as_deref())
                    .await?;
                info!(account_id = %cmd.account_id, "Local-only subscription cancelled");
                Ok(CancelOutcome::CancelledNow)
            }
        }
    }

    async fn cancel_locally(
        &self,
        record: &mut SubscriptionRecord,
        now: Timestamp,
        reason: Option<&str>,
    ) -> Result<(), DomainError> {
        record.transition_status(SubscriptionStatus::Cancelled)?;
        record.note_cancellation(now, reason);
        record.touch(now);
        self.store.update(record).await
    }
}
