//! Method-level subscription guard.
//!
//! Privileged operations outside this engine (prescription issuance, data
//! export) call this guard with the caller's authenticated account id and
//! get a distinguishable `SubscriptionExpired` condition on failure. The
//! request-time HTTP filter lives in the http adapter and maps the same
//! evaluation to a 402 response.

use std::sync::Arc;

use crate::domain::foundation::{AccountId, DomainError, ErrorCode, Timestamp};
use crate::domain::subscription::access;
use crate::ports::SubscriptionStore;

/// Guard over the subscription store; fail-secure.
pub struct SubscriptionGuard {
    store: Arc<dyn SubscriptionStore>,
}

impl SubscriptionGuard {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Ensures the account currently has paid or trial access.
    ///
    /// # Errors
    ///
    /// - `SubscriptionExpired` when the record exists but grants no access
    /// - `SubscriptionNotFound` when no record exists (no implicit access)
    pub async fn ensure_active(&self, account_id: &AccountId) -> Result<(), DomainError> {
        let record = self
            .store
            .find_by_account_id(account_id)
            .await?
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    "Account has no subscription record",
                )
            })?;

        if access::is_active(&record, Timestamp::now()) {
            Ok(())
        } else {
            Err(DomainError::new(
                ErrorCode::SubscriptionExpired,
                access::status_message(&record, Timestamp::now()),
            )
            .with_detail("status", record.status.as_str()))
        }
    }
}
