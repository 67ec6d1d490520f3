//! CheckAccessHandler - read-side access evaluation for an account.

use std::sync::Arc;

use crate::domain::foundation::{AccountId, DomainError, ErrorCode, Timestamp};
use crate::domain::subscription::AccessReport;
use crate::ports::SubscriptionStore;

/// Query for an account's current access state.
#[derive(Debug, Clone)]
pub struct CheckAccessQuery {
    pub account_id: AccountId,
}

/// Handler producing the derived access projection.
pub struct CheckAccessHandler {
    store: Arc<dyn SubscriptionStore>,
}

impl CheckAccessHandler {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Evaluates the account's record at the current instant.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if the account never initialized a trial or
    ///   started a checkout (fail-secure: no record means no access)
    pub async fn handle(&self, query: CheckAccessQuery) -> Result<AccessReport, DomainError> {
        let record = self
            .store
            .find_by_account_id(&query.account_id)
            .await?
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    "Account has no subscription record",
                )
            })?;

        Ok(AccessReport::evaluate(&record, Timestamp::now()))
    }
}
