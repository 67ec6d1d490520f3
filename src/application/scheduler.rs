//! Sweep scheduler - fixed-cadence driver for time-based transitions.
//!
//! Runs the expiry and reminder sweeps on an interval. No overlap guard is
//! needed beyond the sweeps' own idempotency: a run that overlaps another
//! produces no double effects.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::domain::foundation::Timestamp;
use crate::ports::{SubscriptionNotifier, SubscriptionStore};

use super::handlers::subscription::{ExpireTrialsHandler, TrialRemindersHandler};

/// Periodic driver for the trial sweeps.
pub struct SweepScheduler {
    expiry: ExpireTrialsHandler,
    reminders: TrialRemindersHandler,
    interval: Duration,
}

impl SweepScheduler {
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        notifier: Arc<dyn SubscriptionNotifier>,
        reminder_days: Vec<i64>,
        interval: Duration,
    ) -> Self {
        Self {
            expiry: ExpireTrialsHandler::new(store.clone()),
            reminders: TrialRemindersHandler::new(store, notifier, reminder_days),
            interval,
        }
    }

    /// Runs both sweeps once. Errors are logged, not propagated; the next
    /// tick retries whatever this one missed.
    pub async fn run_once(&self) {
        let now = Timestamp::now();

        match self.expiry.handle(now).await {
            Ok(report) => {
                if report.expired > 0 || report.failed > 0 {
                    info!(expired = report.expired, failed = report.failed,
                        "Trial expiry sweep complete");
                }
            }
            Err(e) => error!(error = %e, "Trial expiry sweep failed"),
        }

        match self.reminders.handle(now).await {
            Ok(report) => {
                if report.reminded > 0 || report.failed > 0 {
                    info!(reminded = report.reminded, failed = report.failed,
                        "Trial reminder sweep complete");
                }
            }
            Err(e) => error!(error = %e, "Trial reminder sweep failed"),
        }
    }

    /// Spawns the scheduler loop on the runtime.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
