//! InitializeTrialHandler - grants an account its one-shot trial.

use std::sync::Arc;

use tracing::info;

use crate::domain::foundation::{AccountId, DomainError, ErrorCode, SubscriptionId, Timestamp};
use crate::domain::subscription::{Plan, SubscriptionRecord, SubscriptionStatus};
use crate::ports::SubscriptionStore;

/// Command to initialize a trial for an account.
#[derive(Debug, Clone)]
pub struct InitializeTrialCommand {
    pub account_id: AccountId,
}

/// Handler for trial initialization.
///
/// A trial is granted at most once per account: a record whose `trial_start`
/// is set rejects re-initialization with `TrialAlreadyUsed`, and an account
/// already past Pending (straight-to-paid signups) never gets one.
pub struct InitializeTrialHandler {
    store: Arc<dyn SubscriptionStore>,
    trial_days: i64,
}

impl InitializeTrialHandler {
    pub fn new(store: Arc<dyn SubscriptionStore>, trial_days: i64) -> Self {
        Self { store, trial_days }
    }

    pub async fn handle(
        &self,
        cmd: InitializeTrialCommand,
    ) -> Result<SubscriptionRecord, DomainError> {
        let now = Timestamp::now();

        match self.store.find_by_account_id(&cmd.account_id).await? {
            None => {
                let record = SubscriptionRecord::initialize_trial(
                    SubscriptionId::new(),
                    cmd.account_id,
                    now,
                    self.trial_days,
                );
                self.store.insert(&record).await?;
                info!(account_id = %record.account_id, trial_days = self.trial_days,
                    "Trial initialized");
                Ok(record)
            }
            Some(existing) if existing.trial_used() => Err(DomainError::new(
                ErrorCode::TrialAlreadyUsed,
                "Trial has already been used for this account",
            )),
            Some(mut existing) if existing.status == SubscriptionStatus::Pending => {
                // First contact was a checkout that never completed; the
                // account may still claim its trial.
                existing.transition_status(SubscriptionStatus::Trial)?;
                existing.plan = Plan::Trial;
                existing.trial_start = Some(now);
                existing.trial_end = Some(now.add_days(self.trial_days));
                existing.touch(now);
                self.store.update(&existing).await?;
                info!(account_id = %existing.account_id, "Trial initialized on pending record");
                Ok(existing)
            }
            Some(_) => Err(DomainError::new(
                ErrorCode::TrialAlreadyUsed,
                "Account already has a subscription; trial is unavailable",
            )),
        }
    }
}
