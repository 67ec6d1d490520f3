//! Subscription record aggregate.
//!
//! One record per account holder, owned exclusively by the reconciliation
//! engine. Everything else reads.
//!
//! # Design Decisions
//!
//! - **One per account**: unique constraint on account_id at the store level
//! - **Money in minor units**: amounts stored as i64 cents, never floats
//! - **Fill-once provider ids**: external identifiers are only ever filled
//!   when unknown, never unset or overwritten
//! - **Optimistic version**: the `version` field backs the per-account
//!   serialization boundary in the store

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    AccountId, DomainError, ErrorCode, StateMachine, SubscriptionId, Timestamp,
};

use super::{Plan, SubscriptionStatus};

/// A single account holder's subscription state.
///
/// # Invariants
///
/// - `id` is globally unique; `account_id` is unique across records
/// - `trial_start`/`trial_end` are set exactly once, at trial initialization
/// - Provider identifiers are fill-once (see [`SubscriptionRecord::fill_provider_customer_id`])
/// - Status transitions go through [`SubscriptionRecord::transition_status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Local identity, immutable.
    pub id: SubscriptionId,

    /// Owning account; unique.
    pub account_id: AccountId,

    /// Billing provider's customer identifier, once known.
    pub provider_customer_id: Option<String>,

    /// Billing provider's subscription identifier, once known.
    pub provider_subscription_id: Option<String>,

    /// Current lifecycle status.
    pub status: SubscriptionStatus,

    /// Current plan.
    pub plan: Plan,

    /// Trial bounds; set once at trial initialization, never reset.
    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,

    /// Paid-period bounds, replaced wholesale on renewal/update events.
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    pub next_billing_date: Option<Timestamp>,

    /// Last successful charge, informational.
    pub amount_paid: Option<i64>,
    pub currency: Option<String>,

    /// Set only on cancellation, never cleared.
    pub cancellation_date: Option<Timestamp>,
    pub cancellation_reason: Option<String>,

    /// Last successful invoice timestamp.
    pub last_payment_date: Option<Timestamp>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,

    /// Optimistic concurrency token; incremented by the store on update.
    pub version: i64,
}

impl SubscriptionRecord {
    /// Creates a record with an initialized trial.
    ///
    /// The caller is responsible for checking that the account has not used
    /// its trial before (a record with `trial_start` set means it has).
    pub fn initialize_trial(
        id: SubscriptionId,
        account_id: AccountId,
        now: Timestamp,
        trial_days: i64,
    ) -> Self {
        Self {
            id,
            account_id,
            provider_customer_id: None,
            provider_subscription_id: None,
            status: SubscriptionStatus::Trial,
            plan: Plan::Trial,
            trial_start: Some(now),
            trial_end: Some(now.add_days(trial_days)),
            period_start: None,
            period_end: None,
            next_billing_date: None,
            amount_paid: None,
            currency: None,
            cancellation_date: None,
            cancellation_reason: None,
            last_payment_date: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Creates a pending record for an account whose first contact is a
    /// checkout rather than a trial.
    pub fn pending(id: SubscriptionId, account_id: AccountId, now: Timestamp) -> Self {
        Self {
            id,
            account_id,
            provider_customer_id: None,
            provider_subscription_id: None,
            status: SubscriptionStatus::Pending,
            plan: Plan::Trial,
            trial_start: None,
            trial_end: None,
            period_start: None,
            period_end: None,
            next_billing_date: None,
            amount_paid: None,
            currency: None,
            cancellation_date: None,
            cancellation_reason: None,
            last_payment_date: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// True once the account's one-shot trial has been issued.
    pub fn trial_used(&self) -> bool {
        self.trial_start.is_some()
    }

    /// Fills the provider customer id if it is not yet known.
    ///
    /// Returns true if the value was written. A populated id is never
    /// replaced; replays and late-arriving events make this a no-op.
    pub fn fill_provider_customer_id(&mut self, customer_id: &str) -> bool {
        if self.provider_customer_id.is_some() || customer_id.is_empty() {
            return false;
        }
        self.provider_customer_id = Some(customer_id.to_string());
        true
    }

    /// Fills the provider subscription id if it is not yet known.
    ///
    /// Same fill-once semantics as [`Self::fill_provider_customer_id`].
    pub fn fill_provider_subscription_id(&mut self, subscription_id: &str) -> bool {
        if self.provider_subscription_id.is_some() || subscription_id.is_empty() {
            return false;
        }
        self.provider_subscription_id = Some(subscription_id.to_string());
        true
    }

    /// Moves the record to a new status through the state machine.
    pub fn transition_status(&mut self, target: SubscriptionStatus) -> Result<(), DomainError> {
        self.status = self.status.transition_to(target).map_err(|_| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Cannot transition subscription from {:?} to {:?}",
                    self.status, target
                ),
            )
        })?;
        Ok(())
    }

    /// Records a cancellation timestamp and optional reason.
    ///
    /// Idempotent: an already-set cancellation date is never moved.
    pub fn note_cancellation(&mut self, now: Timestamp, reason: Option<&str>) {
        if self.cancellation_date.is_none() {
            self.cancellation_date = Some(now);
        }
        if self.cancellation_reason.is_none() {
            self.cancellation_reason = reason.map(str::to_string);
        }
    }

    /// Bumps the modification timestamp.
    pub fn touch(&mut self, now: Timestamp) {
        self.updated_at = now;
    }
}
