//! ExpireTrialsHandler - the time-based transition no provider event will
//! ever deliver.
//!
//! The provider has no visibility into the local trial clock before a
//! provider subscription exists, so Trial -> Expired happens here and only
//! here. Each record is an independent committed unit: a crash mid-sweep
//! leaves finished records finished, and the next run picks up the rest.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::subscription::SubscriptionStatus;
use crate::ports::SubscriptionStore;

/// Result of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpirySweepReport {
    pub expired: u32,
    pub failed: u32,
}

/// Handler for the daily trial-expiry sweep.
pub struct ExpireTrialsHandler {
    store: Arc<dyn SubscriptionStore>,
}

impl ExpireTrialsHandler {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Expires every trial whose clock ran out before `now`.
    ///
    /// Individual failures are logged and counted, never propagated; the
    /// sweep is at-least-once and naturally idempotent (an expired record no
    /// longer matches the query).
    pub async fn handle(&self, now: Timestamp) -> Result<ExpirySweepReport, DomainError> {
        let candidates = self.store.find_trials_expired_before(now).await?;
        let mut report = ExpirySweepReport::default();

        for mut record in candidates {
            if let Err(e) = record.transition_status(SubscriptionStatus::Expired) {
                warn!(account_id = %record.account_id, error = %e,
                    "Skipping trial expiry: invalid transition");
                report.failed += 1;
                continue;
            }
            record.touch(now);
            match self.store.update(&record).await {
                Ok(()) => {
                    info!(account_id = %record.account_id, "Trial expired");
                    report.expired += 1;
                }
                Err(e) if e.is_conflict() => {
                    // Someone else (a checkout, another sweep) just wrote
                    // this record; the next run re-evaluates it.
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(account_id = %record.account_id, error = %e,
                        "Failed to persist trial expiry");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
