//! TrialRemindersHandler - reminder sweep over trials nearing their end.
//!
//! Reminders are fire-and-forget: the notification collaborator retries on
//! its own, and one account's failure never blocks the rest of the run. The
//! sweep itself mutates no state.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{SubscriptionNotifier, SubscriptionStore, TrialReminder};

/// Result of one reminder sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderSweepReport {
    pub reminded: u32,
    pub failed: u32,
}

/// Handler for the daily reminder sweep.
pub struct TrialRemindersHandler {
    store: Arc<dyn SubscriptionStore>,
    notifier: Arc<dyn SubscriptionNotifier>,
    /// Reminder tiers in days before trial end, outermost first (e.g. [7, 1]).
    reminder_days: Vec<i64>,
}

impl TrialRemindersHandler {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        notifier: Arc<dyn SubscriptionNotifier>,
        reminder_days: Vec<i64>,
    ) -> Self {
        Self {
            store,
            notifier,
            reminder_days,
        }
    }

    /// Sends one reminder per tier whose one-day bucket contains the trial
    /// end. Running daily, each trial is reminded once per tier.
    pub async fn handle(&self, now: Timestamp) -> Result<ReminderSweepReport, DomainError> {
        let mut report = ReminderSweepReport::default();

        for &days in &self.reminder_days {
            let from = now.add_days(days - 1);
            let until = now.add_days(days);
            let due = self.store.find_trials_ending_between(from, until).await?;

            for record in due {
                let Some(trial_end) = record.trial_end else {
                    continue;
                };
                let reminder = TrialReminder {
                    account_id: record.account_id.clone(),
                    trial_end,
                    days_left: now.days_until(&trial_end),
                };
                match self.notifier.send_trial_reminder(reminder).await {
                    Ok(()) => {
                        info!(account_id = %record.account_id, days,
                            "Trial reminder dispatched");
                        report.reminded += 1;
                    }
                    Err(e) => {
                        warn!(account_id = %record.account_id, days, error = %e,
                            "Trial reminder dispatch failed");
                        report.failed += 1;
                    }
                }
            }
        }

        Ok(report)
    }
}
