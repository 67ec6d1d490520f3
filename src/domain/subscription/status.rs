//! Subscription status state machine.
//!
//! Defines all possible subscription states and valid transitions in the
//! billing lifecycle. The billing provider is the source of truth for paid
//! states, so the machine is deliberately permissive about provider-confirmed
//! moves; what it rules out is ever returning to `Pending` and reviving a
//! record from terminal states by anything other than a confirmed payment.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Current state of a subscription in the billing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Record exists but neither trial nor payment has started.
    /// Created on first contact via checkout before any provider event.
    Pending,

    /// Time-boxed trial access, bounded by the record's trial end date.
    Trial,

    /// Paid subscription, bounded by the current period end (open-ended
    /// when no period end is known).
    Active,

    /// Payment failed. Access is suspended immediately; no grace period.
    PastDue,

    /// Cancelled by the account holder or the provider. Terminal for the
    /// record, but a confirmed checkout may revive it.
    Cancelled,

    /// Trial ran out or the provider gave up collecting. No access.
    Expired,
}

impl SubscriptionStatus {
    /// Returns true if this status can grant access at all.
    ///
    /// Time bounds (trial end, period end) are applied by the access
    /// evaluator on top of this.
    pub fn grants_access(&self) -> bool {
        matches!(self, SubscriptionStatus::Trial | SubscriptionStatus::Active)
    }

    /// Stable string form used in persistence and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        match self {
            // A fresh record can go anywhere the provider or the trial
            // clock sends it.
            Pending => true,
            // Same-state transitions are allowed everywhere below: the
            // provider delivers at-least-once and replays must be no-ops.
            Trial | Active | PastDue => !matches!(target, Pending),
            Cancelled | Expired => matches!(target, Active | Cancelled | Expired),
        }
    }
}
