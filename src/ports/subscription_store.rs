//! Subscription store port (the record's single home).
//!
//! # Design
//!
//! - **Unique account constraint**: one record per account, enforced on insert
//! - **Optimistic concurrency**: `update` compares the record's `version`
//!   against the stored one and fails with `ConcurrencyConflict` on mismatch.
//!   Combined with the engine's re-read-and-reapply loop this yields
//!   single-writer-per-account semantics without blocking other accounts.
//! - **No deletes**: cancellation and expiry are statuses, not row removal

use async_trait::async_trait;

use crate::domain::foundation::{AccountId, DomainError, SubscriptionId, Timestamp};
use crate::domain::subscription::SubscriptionRecord;

/// Persistence port for subscription records.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if the account already has a record
    /// - `DatabaseError` on persistence failure
    async fn insert(&self, record: &SubscriptionRecord) -> Result<(), DomainError>;

    /// Updates an existing record if its version is still current.
    ///
    /// Implementations must increment the stored version on success and the
    /// caller's view becomes stale; re-read before further writes.
    ///
    /// # Errors
    ///
    /// - `ConcurrencyConflict` if the record changed since it was read
    /// - `SubscriptionNotFound` if the record does not exist
    async fn update(&self, record: &SubscriptionRecord) -> Result<(), DomainError>;

    /// Finds a record by its local id.
    async fn find_by_id(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<SubscriptionRecord>, DomainError>;

    /// Finds the record owned by an account. Primary lookup.
    async fn find_by_account_id(
        &self,
        account_id: &AccountId,
    ) -> Result<Option<SubscriptionRecord>, DomainError>;

    /// Finds a record by the provider's subscription id.
    async fn find_by_provider_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError>;

    /// Finds a record by the provider's customer id.
    async fn find_by_provider_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<SubscriptionRecord>, DomainError>;

    /// All trial records whose trial end is strictly before `cutoff`.
    ///
    /// Used by the expiry sweep.
    async fn find_trials_expired_before(
        &self,
        cutoff: Timestamp,
    ) -> Result<Vec<SubscriptionRecord>, DomainError>;

    /// All trial records whose trial end falls within `[from, until)`.
    ///
    /// Used by the reminder sweep.
    async fn find_trials_ending_between(
        &self,
        from: Timestamp,
        until: Timestamp,
    ) -> Result<Vec<SubscriptionRecord>, DomainError>;
}
