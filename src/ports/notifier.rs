//! Notification collaborator port.
//!
//! The email/OTP delivery machinery lives outside this engine; the engine
//! only hands it reminder requests. Dispatch is fire-and-forget: the
//! collaborator retries on its own, and a failure for one account must never
//! abort a sweep for the others.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{AccountId, Timestamp};

/// Reminder handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialReminder {
    pub account_id: AccountId,
    pub trial_end: Timestamp,
    /// Whole days until the trial ends at the time of the sweep.
    pub days_left: i64,
}

/// Port for outbound subscription notifications.
#[async_trait]
pub trait SubscriptionNotifier: Send + Sync {
    /// Sends a trial-ending reminder picked up by the scheduler sweep.
    async fn send_trial_reminder(&self, reminder: TrialReminder) -> Result<(), NotifyError>;

    /// Forwards the provider's trial-will-end notice for a paid subscription.
    async fn send_provider_trial_notice(&self, account_id: &AccountId) -> Result<(), NotifyError>;
}

/// Failure to hand off a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification dispatch failed: {0}")]
    Dispatch(String),
}
