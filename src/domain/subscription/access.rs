//! Access evaluator - pure functions over a subscription record.
//!
//! Answers "does this account currently have paid access" without touching
//! I/O or the clock; callers pass `now` explicitly. Failed payment suspends
//! access immediately: `PastDue` is false here, there is no grace float.

use serde::Serialize;

use crate::domain::foundation::Timestamp;

use super::{Plan, SubscriptionRecord, SubscriptionStatus};

/// Whether the record grants access at `now`.
///
/// - `Active` with no period end is open-ended access.
/// - `Active` with a period end grants access strictly before it.
/// - `Trial` grants access strictly before the trial end.
/// - Every other status denies access.
pub fn is_active(record: &SubscriptionRecord, now: Timestamp) -> bool {
    match record.status {
        SubscriptionStatus::Active => match record.period_end {
            Some(end) => end.is_after(&now),
            None => true,
        },
        SubscriptionStatus::Trial => record
            .trial_end
            .map(|end| end.is_after(&now))
            .unwrap_or(false),
        _ => false,
    }
}

/// Whole days of access remaining; 0 when access has ended or is denied.
///
/// Open-ended active subscriptions report the days until the next billing
/// date when one is known, otherwise 0 (the value is informational only).
pub fn days_remaining(record: &SubscriptionRecord, now: Timestamp) -> i64 {
    match expiry_date(record) {
        Some(end) => now.days_until(&end),
        None => 0,
    }
}

/// The date access ends, if bounded: trial end for trials, period end for
/// everything that has one.
pub fn expiry_date(record: &SubscriptionRecord) -> Option<Timestamp> {
    match record.status {
        SubscriptionStatus::Trial => record.trial_end,
        _ => record.period_end.or(record.next_billing_date),
    }
}

/// True once a trial was issued and its clock has run out.
pub fn is_trial_expired(record: &SubscriptionRecord, now: Timestamp) -> bool {
    match record.trial_end {
        Some(end) => !end.is_after(&now),
        None => false,
    }
}

/// Human-readable status line for account-facing surfaces.
pub fn status_message(record: &SubscriptionRecord, now: Timestamp) -> String {
    match record.status {
        SubscriptionStatus::Trial => {
            if is_active(record, now) {
                format!("Trial active, {} days remaining", days_remaining(record, now))
            } else {
                "Trial expired. Subscribe to continue.".to_string()
            }
        }
        SubscriptionStatus::Active => {
            if is_active(record, now) {
                "Subscription active".to_string()
            } else {
                "Subscription period has ended. Renewal pending.".to_string()
            }
        }
        SubscriptionStatus::PastDue => {
            "Payment failed. Please update your payment method.".to_string()
        }
        SubscriptionStatus::Cancelled => "Subscription cancelled".to_string(),
        SubscriptionStatus::Expired => "Subscription expired. Subscribe to continue.".to_string(),
        SubscriptionStatus::Pending => "Subscription not yet active".to_string(),
    }
}

/// Derived, read-only projection of a record for the rest of the system.
///
/// Never persisted; recomputed per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessReport {
    pub status: SubscriptionStatus,
    pub plan: Plan,
    pub active: bool,
    pub days_remaining: i64,
    pub is_trial_period: bool,
    pub trial_expired: bool,
    pub expiry_date: Option<Timestamp>,
    pub message: String,
}

impl AccessReport {
    /// Evaluates the record at `now`.
    pub fn evaluate(record: &SubscriptionRecord, now: Timestamp) -> Self {
        Self {
            status: record.status,
            plan: record.plan,
            active: is_active(record, now),
            days_remaining: days_remaining(record, now),
            is_trial_period: record.status == SubscriptionStatus::Trial,
            trial_expired: is_trial_expired(record, now),
            expiry_date: expiry_date(record),
            message: status_message(record, now),
        }
    }
}
