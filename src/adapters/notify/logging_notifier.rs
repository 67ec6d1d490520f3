//! Logging implementation of the subscription notifier port.

use async_trait::async_trait;
use tracing::info;

use crate::domain::foundation::AccountId;
use crate::ports::{NotifyError, SubscriptionNotifier, TrialReminder};

/// Notifier that records reminders in the log instead of sending email.
///
/// Stands in wherever the email collaborator is not wired up (local
/// development, tests, partial deployments).
#[derive(Debug, Default)]
pub struct LoggingNotifier;

impl LoggingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SubscriptionNotifier for LoggingNotifier {
    async fn send_trial_reminder(&self, reminder: TrialReminder) -> Result<(), NotifyError> {
        info!(
            account_id = %reminder.account_id,
            days_left = reminder.days_left,
            "Trial reminder (logging notifier)"
        );
        Ok(())
    }

    async fn send_provider_trial_notice(&self, account_id: &AccountId) -> Result<(), NotifyError> {
        info!(account_id = %account_id, "Provider trial-will-end notice (logging notifier)");
        Ok(())
    }
}
