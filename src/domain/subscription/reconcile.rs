//! Reconciliation engine - the single authorized mutator of subscription
//! records.
//!
//! Converts heterogeneous, unreliable provider signals (delivered
//! asynchronously, at-least-once, out of order, sometimes before the local
//! record knows the provider's identifiers) into idempotent,
//! order-independent state updates.
//!
//! ## Identity resolution
//!
//! Applied in order, first hit wins:
//! 1. exact match on the provider subscription id
//! 2. match on the provider customer id (backfills the subscription id)
//! 3. match on the account id carried in payload metadata (backfills both)
//!
//! An unmatched event is dropped and logged - an expected outcome of webhook
//! replay and test events, not an error.
//!
//! ## Concurrency
//!
//! Writes go through a read-modify-write loop against the store's optimistic
//! version check. A conflict means another writer touched the same account's
//! record first; the engine re-reads and re-applies, so the merge always runs
//! against the latest committed state. Writers for different accounts never
//! contend.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::foundation::{AccountId, DomainError, StateMachine, Timestamp};
use crate::ports::{SubscriptionNotifier, SubscriptionStore};

use super::provider_event::{
    BillingEvent, CheckoutFacts, InvoiceFacts, ProviderSubscriptionStatus, SubscriptionFacts,
};
use super::record::SubscriptionRecord;
use super::status::SubscriptionStatus;
use super::Plan;

/// Fallback paid-period length when a checkout event carries no provider
/// period end.
const FALLBACK_PERIOD_DAYS: i64 = 365;

/// How often a version conflict is retried before giving up. Conflicts are
/// per-account and short-lived; more than a couple in a row means something
/// is wrong.
const MAX_CONFLICT_RETRIES: u32 = 3;

/// What the engine did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Event matched a record and was merged into it.
    Applied {
        account_id: AccountId,
        status: SubscriptionStatus,
    },
    /// Trial-will-end notice forwarded to the notification collaborator.
    Forwarded { account_id: AccountId },
    /// No record matched any identity key. Dropped.
    Unmatched,
    /// Event kind is not in the transition table. Dropped.
    Ignored { kind: String },
}

/// How an event was matched to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    BySubscriptionId,
    ByCustomerId,
    ByAccountMetadata,
}

/// The single writer of subscription state.
pub struct ReconciliationEngine {
    store: Arc<dyn SubscriptionStore>,
    notifier: Arc<dyn SubscriptionNotifier>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn SubscriptionStore>, notifier: Arc<dyn SubscriptionNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Applies one provider event to the store.
    ///
    /// Returns `Ok` for every expected outcome including unmatched and
    /// unknown events; an `Err` means a recognized, resolved event could not
    /// be applied (invalid transition, storage failure) and is for the caller
    /// to log - webhook callers still acknowledge the delivery.
    pub async fn apply(
        &self,
        event: &BillingEvent,
        now: Timestamp,
    ) -> Result<ReconcileOutcome, DomainError> {
        if let BillingEvent::Unknown { kind } = event {
            debug!(kind = %kind, "Ignoring unknown billing event kind");
            return Ok(ReconcileOutcome::Ignored { kind: kind.clone() });
        }

        let mut attempt = 0;
        loop {
            let Some((mut record, resolution)) = self.resolve(event).await? else {
                warn!(
                    kind = event.kind(),
                    subscription_id = event.subscription_id().unwrap_or("-"),
                    customer_id = event.customer_id().unwrap_or("-"),
                    "Dropping billing event: no matching subscription record"
                );
                return Ok(ReconcileOutcome::Unmatched);
            };

            debug!(
                kind = event.kind(),
                account_id = %record.account_id,
                resolution = ?resolution,
                "Resolved billing event"
            );

            // The notice row mutates nothing; forward and stop.
            if let BillingEvent::TrialWillEnd(_) = event {
                if let Err(e) = self
                    .notifier
                    .send_provider_trial_notice(&record.account_id)
                    .await
                {
                    warn!(account_id = %record.account_id, error = %e,
                        "Failed to forward trial-will-end notice");
                }
                return Ok(ReconcileOutcome::Forwarded {
                    account_id: record.account_id,
                });
            }

            // Opportunistic backfill: identifiers fill once, so replays and
            // higher-tier resolutions make this a no-op.
            let mut changed = backfill_provider_ids(&mut record, event);

            changed |= merge(&mut record, event, now)?;

            if !changed {
                debug!(account_id = %record.account_id, kind = event.kind(),
                    "Billing event produced no change");
                return Ok(ReconcileOutcome::Applied {
                    account_id: record.account_id,
                    status: record.status,
                });
            }

            record.touch(now);
            match self.store.update(&record).await {
                Ok(()) => {
                    info!(
                        account_id = %record.account_id,
                        kind = event.kind(),
                        status = record.status.as_str(),
                        "Applied billing event"
                    );
                    return Ok(ReconcileOutcome::Applied {
                        account_id: record.account_id,
                        status: record.status,
                    });
                }
                Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_RETRIES => {
                    attempt += 1;
                    debug!(
                        account_id = %record.account_id,
                        attempt,
                        "Version conflict applying billing event; re-reading"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Identity resolution, first hit wins.
    async fn resolve(
        &self,
        event: &BillingEvent,
    ) -> Result<Option<(SubscriptionRecord, Resolution)>, DomainError> {
        if let Some(subscription_id) = event.subscription_id() {
            if let Some(record) = self
                .store
                .find_by_provider_subscription_id(subscription_id)
                .await?
            {
                return Ok(Some((record, Resolution::BySubscriptionId)));
            }
        }
        if let Some(customer_id) = event.customer_id() {
            if let Some(record) = self.store.find_by_provider_customer_id(customer_id).await? {
                return Ok(Some((record, Resolution::ByCustomerId)));
            }
        }
        if let Some(account_id) = event.account_id() {
            if let Some(record) = self.store.find_by_account_id(account_id).await? {
                return Ok(Some((record, Resolution::ByAccountMetadata)));
            }
        }
        Ok(None)
    }
}

/// Fills provider identifiers the record does not know yet.
fn backfill_provider_ids(record: &mut SubscriptionRecord, event: &BillingEvent) -> bool {
    let mut changed = false;
    if let Some(customer_id) = event.customer_id() {
        changed |= record.fill_provider_customer_id(customer_id);
    }
    if let Some(subscription_id) = event.subscription_id() {
        changed |= record.fill_provider_subscription_id(subscription_id);
    }
    changed
}

/// The deterministic merge function: one transition-table row per variant.
///
/// Pure over (record, event, now); returns whether the record changed.
/// Applying the same event twice at the same instant leaves the record
/// identical to applying it once.
pub fn merge(
    record: &mut SubscriptionRecord,
    event: &BillingEvent,
    now: Timestamp,
) -> Result<bool, DomainError> {
    match event {
        BillingEvent::CheckoutCompleted(facts) => merge_checkout(record, facts, now),
        BillingEvent::SubscriptionUpdated(facts) => merge_subscription_status(record, facts, now),
        BillingEvent::SubscriptionDeleted(facts) => merge_deleted(record, facts, now),
        BillingEvent::InvoicePaymentSucceeded(facts) => merge_invoice_paid(record, facts, now),
        BillingEvent::InvoicePaymentFailed(_) => merge_invoice_failed(record),
        // Handled before merge; nothing to do if called directly.
        BillingEvent::TrialWillEnd(_) => Ok(false),
        BillingEvent::Unknown { .. } => Ok(false),
    }
}

fn merge_checkout(
    record: &mut SubscriptionRecord,
    facts: &CheckoutFacts,
    now: Timestamp,
) -> Result<bool, DomainError> {
    let already_paid_active =
        record.status == SubscriptionStatus::Active && record.plan == Plan::Paid;

    record.transition_status(SubscriptionStatus::Active)?;
    let mut changed = !already_paid_active;
    changed |= set_plan(record, Plan::Paid);

    // A replayed checkout must not restart an established period; a checkout
    // landing after an invoice already seeded bounds must not stomp them.
    if record.period_start.is_none() {
        record.period_start = Some(now);
        changed = true;
    }
    if record.period_end.is_none() {
        let end = facts
            .period_end
            .unwrap_or_else(|| now.add_days(FALLBACK_PERIOD_DAYS));
        record.period_end = Some(end);
        record.next_billing_date = Some(end);
        changed = true;
    }

    changed |= record_charge(record, facts.amount_total, facts.currency.as_deref());
    Ok(changed)
}

fn merge_subscription_status(
    record: &mut SubscriptionRecord,
    facts: &SubscriptionFacts,
    now: Timestamp,
) -> Result<bool, DomainError> {
    match facts.status {
        ProviderSubscriptionStatus::Active => {
            let before = (
                record.status,
                record.plan,
                record.period_start,
                record.period_end,
                record.next_billing_date,
            );
            record.transition_status(SubscriptionStatus::Active)?;
            set_plan(record, Plan::Paid);
            if record.period_start.is_none() {
                record.period_start = facts.period_start;
            }
            // Provider-confirmed bounds replace local ones wholesale.
            if let Some(end) = facts.period_end {
                record.period_end = Some(end);
                record.next_billing_date = Some(end);
            }
            let after = (
                record.status,
                record.plan,
                record.period_start,
                record.period_end,
                record.next_billing_date,
            );
            Ok(before != after)
        }
        ProviderSubscriptionStatus::Trialing => {
            // Idempotent: only ever moves a non-trial record into Trial, and
            // never revives a terminal one.
            if record.status == SubscriptionStatus::Trial
                || !record.status.can_transition_to(&SubscriptionStatus::Trial)
            {
                return Ok(false);
            }
            record.transition_status(SubscriptionStatus::Trial)?;
            Ok(true)
        }
        ProviderSubscriptionStatus::PastDue => {
            if record.status == SubscriptionStatus::PastDue {
                return Ok(false);
            }
            record.transition_status(SubscriptionStatus::PastDue)?;
            Ok(true)
        }
        ProviderSubscriptionStatus::Canceled => {
            let was_cancelled = record.status == SubscriptionStatus::Cancelled;
            record.transition_status(SubscriptionStatus::Cancelled)?;
            record.note_cancellation(now, None);
            Ok(!was_cancelled)
        }
        ProviderSubscriptionStatus::Unpaid => {
            if record.status == SubscriptionStatus::Expired {
                return Ok(false);
            }
            record.transition_status(SubscriptionStatus::Expired)?;
            Ok(true)
        }
        // Not in the transition table; forward compatibility no-op.
        ProviderSubscriptionStatus::Incomplete
        | ProviderSubscriptionStatus::IncompleteExpired
        | ProviderSubscriptionStatus::Paused
        | ProviderSubscriptionStatus::Unknown => {
            debug!(status = ?facts.status, "Provider subscription status outside transition table");
            Ok(false)
        }
    }
}

fn merge_deleted(
    record: &mut SubscriptionRecord,
    _facts: &SubscriptionFacts,
    now: Timestamp,
) -> Result<bool, DomainError> {
    if record.status == SubscriptionStatus::Cancelled {
        // Already cancelled (immediate cancellation path); the provider's
        // deletion event is the confirmation, not a change.
        record.note_cancellation(now, None);
        return Ok(false);
    }
    record.transition_status(SubscriptionStatus::Cancelled)?;
    record.note_cancellation(now, None);
    Ok(true)
}

fn merge_invoice_paid(
    record: &mut SubscriptionRecord,
    facts: &InvoiceFacts,
    now: Timestamp,
) -> Result<bool, DomainError> {
    let was = (record.status, record.plan, record.last_payment_date);

    record.transition_status(SubscriptionStatus::Active)?;
    set_plan(record, Plan::Paid);
    record.last_payment_date = Some(now);

    // Seed period bounds only when absent: an invoice is weaker evidence
    // than an authoritative subscription object and must never overwrite a
    // later, more authoritative period.
    if record.period_start.is_none() {
        record.period_start = facts.period_start;
    }
    if record.period_end.is_none() {
        record.period_end = facts.period_end;
        if record.next_billing_date.is_none() {
            record.next_billing_date = facts.period_end;
        }
    }

    let mut changed = was != (record.status, record.plan, record.last_payment_date);
    changed |= record_charge(record, facts.amount_paid, facts.currency.as_deref());
    Ok(changed)
}

fn merge_invoice_failed(record: &mut SubscriptionRecord) -> Result<bool, DomainError> {
    if record.status == SubscriptionStatus::PastDue {
        return Ok(false);
    }
    record.transition_status(SubscriptionStatus::PastDue)?;
    Ok(true)
}

fn set_plan(record: &mut SubscriptionRecord, plan: Plan) -> bool {
    if record.plan == plan {
        return false;
    }
    record.plan = plan;
    true
}

fn record_charge(
    record: &mut SubscriptionRecord,
    amount: Option<i64>,
    currency: Option<&str>,
) -> bool {
    let mut changed = false;
    if let Some(amount) = amount {
        if record.amount_paid != Some(amount) {
            record.amount_paid = Some(amount);
            changed = true;
        }
    }
    if let Some(currency) = currency {
        if record.currency.as_deref() != Some(currency) {
            record.currency = Some(currency.to_string());
            changed = true;
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ErrorCode, SubscriptionId};
    use crate::ports::{NotifyError, TrialReminder};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    // ══════════════════════════════════════════════════════════════
    // Test infrastructure
    // ══════════════════════════════════════════════════════════════

    /// In-memory store with the same optimistic version semantics as the
    /// Postgres adapter. Can inject a fixed number of artificial conflicts.
    struct MemoryStore {
        records: Mutex<HashMap<String, SubscriptionRecord>>,
        forced_conflicts: AtomicU32,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                records: Mutex::new(HashMap::new()),
                forced_conflicts: AtomicU32::new(0),
            }
        }

        fn with_record(record: SubscriptionRecord) -> Self {
            let store = Self::new();
            store
                .records
                .lock()
                .unwrap()
                .insert(record.account_id.to_string(), record);
            store
        }

        fn force_conflicts(&self, n: u32) {
            self.forced_conflicts.store(n, Ordering::SeqCst);
        }

        fn get(&self, account: &str) -> SubscriptionRecord {
            self.records.lock().unwrap().get(account).unwrap().clone()
        }
    }

    #[async_trait]
    impl SubscriptionStore for MemoryStore {
        async fn insert(&self, record: &SubscriptionRecord) -> Result<(), DomainError> {
            let mut records = self.records.lock().unwrap();
            if records.contains_key(record.account_id.as_str()) {
                return Err(DomainError::validation(
                    "account_id",
                    "Account already has a subscription record",
                ));
            }
            records.insert(record.account_id.to_string(), record.clone());
            Ok(())
        }

        async fn update(&self, record: &SubscriptionRecord) -> Result<(), DomainError> {
            if self.forced_conflicts.load(Ordering::SeqCst) > 0 {
                self.forced_conflicts.fetch_sub(1, Ordering::SeqCst);
                return Err(DomainError::conflict("forced test conflict"));
            }
            let mut records = self.records.lock().unwrap();
            let Some(stored) = records.get_mut(record.account_id.as_str()) else {
                return Err(DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    "No such record",
                ));
            };
            if stored.version != record.version {
                return Err(DomainError::conflict("stale version"));
            }
            let mut updated = record.clone();
            updated.version += 1;
            *stored = updated;
            Ok(())
        }

        async fn find_by_id(
            &self,
            id: &SubscriptionId,
        ) -> Result<Option<SubscriptionRecord>, DomainError> {
            let records = self.records.lock().unwrap();
            Ok(records.values().find(|r| &r.id == id).cloned())
        }

        async fn find_by_account_id(
            &self,
            account_id: &AccountId,
        ) -> Result<Option<SubscriptionRecord>, DomainError> {
            let records = self.records.lock().unwrap();
            Ok(records.get(account_id.as_str()).cloned())
        }

        async fn find_by_provider_subscription_id(
            &self,
            subscription_id: &str,
        ) -> Result<Option<SubscriptionRecord>, DomainError> {
            let records = self.records.lock().unwrap();
            Ok(records
                .values()
                .find(|r| r.provider_subscription_id.as_deref() == Some(subscription_id))
                .cloned())
        }

        async fn find_by_provider_customer_id(
            &self,
            customer_id: &str,
        ) -> Result<Option<SubscriptionRecord>, DomainError> {
            let records = self.records.lock().unwrap();
            Ok(records
                .values()
                .find(|r| r.provider_customer_id.as_deref() == Some(customer_id))
                .cloned())
        }

        async fn find_trials_expired_before(
            &self,
            cutoff: Timestamp,
        ) -> Result<Vec<SubscriptionRecord>, DomainError> {
            let records = self.records.lock().unwrap();
            Ok(records
                .values()
                .filter(|r| {
                    r.status == SubscriptionStatus::Trial
                        && r.trial_end.map(|end| end.is_before(&cutoff)).unwrap_or(false)
                })
                .cloned()
                .collect())
        }

        async fn find_trials_ending_between(
            &self,
            from: Timestamp,
            until: Timestamp,
        ) -> Result<Vec<SubscriptionRecord>, DomainError> {
            let records = self.records.lock().unwrap();
            Ok(records
                .values()
                .filter(|r| {
                    r.status == SubscriptionStatus::Trial
                        && r.trial_end
                            .map(|end| !end.is_before(&from) && end.is_before(&until))
                            .unwrap_or(false)
                })
                .cloned()
                .collect())
        }
    }

    struct MemoryNotifier {
        notices: Mutex<Vec<String>>,
        fail: bool,
    }

    impl MemoryNotifier {
        fn new() -> Self {
            Self {
                notices: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                notices: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn notices(&self) -> Vec<String> {
            self.notices.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SubscriptionNotifier for MemoryNotifier {
        async fn send_trial_reminder(&self, reminder: TrialReminder) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Dispatch("down".to_string()));
            }
            self.notices
                .lock()
                .unwrap()
                .push(format!("reminder:{}", reminder.account_id));
            Ok(())
        }

        async fn send_provider_trial_notice(
            &self,
            account_id: &AccountId,
        ) -> Result<(), NotifyError> {
            if self.fail {
                return Err(NotifyError::Dispatch("down".to_string()));
            }
            self.notices
                .lock()
                .unwrap()
                .push(format!("notice:{}", account_id));
            Ok(())
        }
    }

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(1_705_276_800).unwrap()
    }

    fn account() -> AccountId {
        AccountId::new("acct-1").unwrap()
    }

    fn trial_record() -> SubscriptionRecord {
        SubscriptionRecord::initialize_trial(SubscriptionId::new(), account(), now(), 90)
    }

    fn linked_record() -> SubscriptionRecord {
        let mut record = trial_record();
        record.fill_provider_customer_id("cus_1");
        record.fill_provider_subscription_id("sub_1");
        record
    }

    fn checkout_event(customer: Option<&str>, subscription: Option<&str>, acct: Option<&str>) -> BillingEvent {
        BillingEvent::CheckoutCompleted(CheckoutFacts {
            session_id: "cs_1".to_string(),
            customer_id: customer.map(str::to_string),
            subscription_id: subscription.map(str::to_string),
            account_id: acct.map(|a| AccountId::new(a).unwrap()),
            amount_total: Some(4900),
            currency: Some("eur".to_string()),
            period_end: None,
        })
    }

    fn subscription_event(status: ProviderSubscriptionStatus) -> BillingEvent {
        BillingEvent::SubscriptionUpdated(SubscriptionFacts {
            subscription_id: "sub_1".to_string(),
            customer_id: Some("cus_1".to_string()),
            account_id: None,
            status,
            period_start: Some(now()),
            period_end: Some(now().add_days(30)),
            cancel_at_period_end: false,
        })
    }

    fn invoice_event(kind_paid: bool) -> BillingEvent {
        let facts = InvoiceFacts {
            invoice_id: "in_1".to_string(),
            customer_id: Some("cus_1".to_string()),
            subscription_id: Some("sub_1".to_string()),
            account_id: None,
            amount_paid: Some(4900),
            currency: Some("eur".to_string()),
            period_start: Some(now()),
            period_end: Some(now().add_days(30)),
        };
        if kind_paid {
            BillingEvent::InvoicePaymentSucceeded(facts)
        } else {
            BillingEvent::InvoicePaymentFailed(facts)
        }
    }

    fn engine(store: Arc<MemoryStore>, notifier: Arc<MemoryNotifier>) -> ReconciliationEngine {
        ReconciliationEngine::new(store, notifier)
    }

    // ══════════════════════════════════════════════════════════════
    // Identity resolution
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn resolves_by_subscription_id_first() {
        let store = Arc::new(MemoryStore::with_record(linked_record()));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));

        let outcome = eng
            .apply(&subscription_event(ProviderSubscriptionStatus::PastDue), now())
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Applied { .. }));
        assert_eq!(store.get("acct-1").status, SubscriptionStatus::PastDue);
    }

    #[tokio::test]
    async fn resolves_by_customer_id_and_backfills_subscription_id() {
        let mut record = trial_record();
        record.fill_provider_customer_id("cus_1");
        let store = Arc::new(MemoryStore::with_record(record));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));

        eng.apply(&invoice_event(true), now()).await.unwrap();

        let stored = store.get("acct-1");
        assert_eq!(stored.provider_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(stored.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn resolves_by_account_metadata_and_backfills_both_ids() {
        let store = Arc::new(MemoryStore::with_record(trial_record()));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));

        let outcome = eng
            .apply(&checkout_event(Some("cus_1"), Some("sub_1"), Some("acct-1")), now())
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Applied { .. }));
        let stored = store.get("acct-1");
        assert_eq!(stored.provider_customer_id.as_deref(), Some("cus_1"));
        assert_eq!(stored.provider_subscription_id.as_deref(), Some("sub_1"));
    }

    #[tokio::test]
    async fn backfilled_ids_enable_direct_resolution_later() {
        let store = Arc::new(MemoryStore::with_record(trial_record()));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));

        // First event only matches via metadata.
        eng.apply(&checkout_event(Some("cus_1"), Some("sub_1"), Some("acct-1")), now())
            .await
            .unwrap();

        // Second event carries no metadata; must now match by subscription id.
        let outcome = eng
            .apply(&subscription_event(ProviderSubscriptionStatus::PastDue), now())
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Applied { .. }));
        assert_eq!(store.get("acct-1").status, SubscriptionStatus::PastDue);
    }

    #[tokio::test]
    async fn unmatched_event_is_dropped_not_an_error() {
        let store = Arc::new(MemoryStore::new());
        let eng = engine(store, Arc::new(MemoryNotifier::new()));

        let outcome = eng
            .apply(&checkout_event(Some("cus_x"), Some("sub_x"), None), now())
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Unmatched);
    }

    #[tokio::test]
    async fn unknown_kind_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let eng = engine(store, Arc::new(MemoryNotifier::new()));

        let outcome = eng
            .apply(
                &BillingEvent::Unknown {
                    kind: "charge.refund.updated".to_string(),
                },
                now(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome::Ignored {
                kind: "charge.refund.updated".to_string()
            }
        );
    }

    // ══════════════════════════════════════════════════════════════
    // Transition table
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn checkout_activates_trial_account() {
        let store = Arc::new(MemoryStore::with_record(trial_record()));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));

        eng.apply(&checkout_event(Some("cus_1"), Some("sub_1"), Some("acct-1")), now())
            .await
            .unwrap();

        let stored = store.get("acct-1");
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert_eq!(stored.plan, Plan::Paid);
        assert_eq!(stored.period_start, Some(now()));
        assert_eq!(stored.period_end, Some(now().add_days(FALLBACK_PERIOD_DAYS)));
        assert_eq!(stored.next_billing_date, stored.period_end);
        assert_eq!(stored.amount_paid, Some(4900));
        assert_eq!(stored.currency.as_deref(), Some("eur"));
    }

    #[tokio::test]
    async fn provider_active_refreshes_period_wholesale() {
        let store = Arc::new(MemoryStore::with_record(linked_record()));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));

        eng.apply(&subscription_event(ProviderSubscriptionStatus::Active), now())
            .await
            .unwrap();

        let stored = store.get("acct-1");
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert_eq!(stored.period_end, Some(now().add_days(30)));
        assert_eq!(stored.next_billing_date, Some(now().add_days(30)));
    }

    #[tokio::test]
    async fn provider_trialing_is_noop_when_already_trial() {
        let store = Arc::new(MemoryStore::with_record(linked_record()));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));
        let version_before = store.get("acct-1").version;

        eng.apply(&subscription_event(ProviderSubscriptionStatus::Trialing), now())
            .await
            .unwrap();

        let stored = store.get("acct-1");
        assert_eq!(stored.status, SubscriptionStatus::Trial);
        assert_eq!(stored.version, version_before);
    }

    #[tokio::test]
    async fn provider_past_due_suspends() {
        let store = Arc::new(MemoryStore::with_record(linked_record()));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));

        eng.apply(&subscription_event(ProviderSubscriptionStatus::PastDue), now())
            .await
            .unwrap();

        assert_eq!(store.get("acct-1").status, SubscriptionStatus::PastDue);
    }

    #[tokio::test]
    async fn provider_canceled_sets_cancellation_date() {
        let store = Arc::new(MemoryStore::with_record(linked_record()));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));

        eng.apply(&subscription_event(ProviderSubscriptionStatus::Canceled), now())
            .await
            .unwrap();

        let stored = store.get("acct-1");
        assert_eq!(stored.status, SubscriptionStatus::Cancelled);
        assert_eq!(stored.cancellation_date, Some(now()));
    }

    #[tokio::test]
    async fn provider_unpaid_expires() {
        let store = Arc::new(MemoryStore::with_record(linked_record()));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));

        eng.apply(&subscription_event(ProviderSubscriptionStatus::Unpaid), now())
            .await
            .unwrap();

        assert_eq!(store.get("acct-1").status, SubscriptionStatus::Expired);
    }

    #[tokio::test]
    async fn invoice_paid_activates_and_records_payment() {
        let store = Arc::new(MemoryStore::with_record(linked_record()));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));

        eng.apply(&invoice_event(true), now()).await.unwrap();

        let stored = store.get("acct-1");
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert_eq!(stored.plan, Plan::Paid);
        assert_eq!(stored.last_payment_date, Some(now()));
        assert_eq!(stored.period_end, Some(now().add_days(30)));
    }

    #[tokio::test]
    async fn invoice_paid_never_overwrites_existing_period() {
        let mut record = linked_record();
        record.status = SubscriptionStatus::Active;
        record.plan = Plan::Paid;
        record.period_start = Some(now().add_days(-5));
        record.period_end = Some(now().add_days(300));
        let store = Arc::new(MemoryStore::with_record(record));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));

        eng.apply(&invoice_event(true), now()).await.unwrap();

        let stored = store.get("acct-1");
        assert_eq!(stored.period_start, Some(now().add_days(-5)));
        assert_eq!(stored.period_end, Some(now().add_days(300)));
    }

    #[tokio::test]
    async fn invoice_failed_suspends_immediately() {
        let mut record = linked_record();
        record.status = SubscriptionStatus::Active;
        record.plan = Plan::Paid;
        record.period_end = Some(now().add_days(20));
        let store = Arc::new(MemoryStore::with_record(record));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));

        eng.apply(&invoice_event(false), now()).await.unwrap();

        let stored = store.get("acct-1");
        assert_eq!(stored.status, SubscriptionStatus::PastDue);
        // Period bounds untouched.
        assert_eq!(stored.period_end, Some(now().add_days(20)));
    }

    #[tokio::test]
    async fn subscription_deleted_cancels_and_is_idempotent() {
        let store = Arc::new(MemoryStore::with_record(linked_record()));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));

        let deleted = BillingEvent::SubscriptionDeleted(SubscriptionFacts {
            subscription_id: "sub_1".to_string(),
            customer_id: Some("cus_1".to_string()),
            account_id: None,
            status: ProviderSubscriptionStatus::Canceled,
            period_start: None,
            period_end: None,
            cancel_at_period_end: false,
        });

        eng.apply(&deleted, now()).await.unwrap();
        let first = store.get("acct-1");
        assert_eq!(first.status, SubscriptionStatus::Cancelled);
        assert_eq!(first.cancellation_date, Some(now()));

        // Redelivery a day later changes nothing.
        eng.apply(&deleted, now().add_days(1)).await.unwrap();
        let second = store.get("acct-1");
        assert_eq!(second.cancellation_date, Some(now()));
        assert_eq!(second.version, first.version);
    }

    #[tokio::test]
    async fn trial_will_end_forwards_without_mutation() {
        let store = Arc::new(MemoryStore::with_record(linked_record()));
        let notifier = Arc::new(MemoryNotifier::new());
        let eng = engine(store.clone(), notifier.clone());
        let before = store.get("acct-1");

        let notice = BillingEvent::TrialWillEnd(SubscriptionFacts {
            subscription_id: "sub_1".to_string(),
            customer_id: Some("cus_1".to_string()),
            account_id: None,
            status: ProviderSubscriptionStatus::Trialing,
            period_start: None,
            period_end: None,
            cancel_at_period_end: false,
        });
        let outcome = eng.apply(&notice, now()).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Forwarded { .. }));
        assert_eq!(notifier.notices(), vec!["notice:acct-1".to_string()]);
        assert_eq!(store.get("acct-1"), before);
    }

    #[tokio::test]
    async fn trial_will_end_notifier_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::with_record(linked_record()));
        let eng = engine(store, Arc::new(MemoryNotifier::failing()));

        let notice = BillingEvent::TrialWillEnd(SubscriptionFacts {
            subscription_id: "sub_1".to_string(),
            customer_id: None,
            account_id: None,
            status: ProviderSubscriptionStatus::Trialing,
            period_start: None,
            period_end: None,
            cancel_at_period_end: false,
        });

        assert!(matches!(
            eng.apply(&notice, now()).await.unwrap(),
            ReconcileOutcome::Forwarded { .. }
        ));
    }

    // ══════════════════════════════════════════════════════════════
    // Idempotence and ordering
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn checkout_applied_twice_equals_once() {
        let store = Arc::new(MemoryStore::with_record(trial_record()));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));
        let event = checkout_event(Some("cus_1"), Some("sub_1"), Some("acct-1"));

        eng.apply(&event, now()).await.unwrap();
        let after_once = store.get("acct-1");

        eng.apply(&event, now()).await.unwrap();
        let after_twice = store.get("acct-1");

        assert_eq!(after_once, after_twice);
    }

    #[tokio::test]
    async fn invoice_before_checkout_still_ends_active_with_bounds() {
        let store = Arc::new(MemoryStore::with_record(trial_record()));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));

        // Invoice arrives first, resolvable only through... nothing. It has
        // customer and subscription ids the record does not know yet, so it
        // drops. Realistic out-of-order delivery starts from a record that
        // knows the customer id (checkout created it).
        let mut record = store.get("acct-1");
        record.fill_provider_customer_id("cus_1");
        store.update(&record).await.unwrap();

        eng.apply(&invoice_event(true), now()).await.unwrap();
        eng.apply(&checkout_event(Some("cus_1"), Some("sub_1"), Some("acct-1")), now())
            .await
            .unwrap();

        let stored = store.get("acct-1");
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert_eq!(stored.plan, Plan::Paid);
        // Bounds came from the invoice and the late checkout kept them.
        assert_eq!(stored.period_end, Some(now().add_days(30)));
    }

    #[tokio::test]
    async fn version_conflict_is_retried_and_applied_once() {
        let store = Arc::new(MemoryStore::with_record(linked_record()));
        store.force_conflicts(2);
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));

        let outcome = eng
            .apply(&subscription_event(ProviderSubscriptionStatus::PastDue), now())
            .await
            .unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Applied { .. }));
        let stored = store.get("acct-1");
        assert_eq!(stored.status, SubscriptionStatus::PastDue);
        // One successful write after the conflicts.
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn conflict_budget_exhaustion_surfaces_error() {
        let store = Arc::new(MemoryStore::with_record(linked_record()));
        store.force_conflicts(MAX_CONFLICT_RETRIES + 1);
        let eng = engine(store, Arc::new(MemoryNotifier::new()));

        let err = eng
            .apply(&subscription_event(ProviderSubscriptionStatus::PastDue), now())
            .await
            .unwrap_err();

        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn invalid_transition_surfaces_error_for_caller_to_swallow() {
        let mut record = linked_record();
        record.status = SubscriptionStatus::Cancelled;
        let store = Arc::new(MemoryStore::with_record(record));
        let eng = engine(store.clone(), Arc::new(MemoryNotifier::new()));

        // Cancelled -> PastDue is not a lawful move.
        let err = eng
            .apply(&invoice_event(false), now())
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
        assert_eq!(store.get("acct-1").status, SubscriptionStatus::Cancelled);
    }

    // ══════════════════════════════════════════════════════════════
    // Merge function properties
    // ══════════════════════════════════════════════════════════════

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_status() -> impl Strategy<Value = ProviderSubscriptionStatus> {
            prop_oneof![
                Just(ProviderSubscriptionStatus::Active),
                Just(ProviderSubscriptionStatus::Trialing),
                Just(ProviderSubscriptionStatus::PastDue),
                Just(ProviderSubscriptionStatus::Canceled),
                Just(ProviderSubscriptionStatus::Unpaid),
            ]
        }

        fn arb_event() -> impl Strategy<Value = BillingEvent> {
            let checkout = (any::<Option<i64>>(), proptest::option::of("[a-z]{3}")).prop_map(
                |(amount, currency)| {
                    BillingEvent::CheckoutCompleted(CheckoutFacts {
                        session_id: "cs_p".to_string(),
                        customer_id: Some("cus_1".to_string()),
                        subscription_id: Some("sub_1".to_string()),
                        account_id: None,
                        amount_total: amount,
                        currency,
                        period_end: None,
                    })
                },
            );
            let subscription = arb_status().prop_map(|status| {
                BillingEvent::SubscriptionUpdated(SubscriptionFacts {
                    subscription_id: "sub_1".to_string(),
                    customer_id: Some("cus_1".to_string()),
                    account_id: None,
                    status,
                    period_start: Timestamp::from_unix_secs(1_705_276_800),
                    period_end: Timestamp::from_unix_secs(1_707_955_200),
                    cancel_at_period_end: false,
                })
            });
            let invoice = any::<bool>().prop_map(|paid| {
                let facts = InvoiceFacts {
                    invoice_id: "in_p".to_string(),
                    customer_id: Some("cus_1".to_string()),
                    subscription_id: Some("sub_1".to_string()),
                    account_id: None,
                    amount_paid: Some(4900),
                    currency: Some("eur".to_string()),
                    period_start: Timestamp::from_unix_secs(1_705_276_800),
                    period_end: Timestamp::from_unix_secs(1_707_955_200),
                };
                if paid {
                    BillingEvent::InvoicePaymentSucceeded(facts)
                } else {
                    BillingEvent::InvoicePaymentFailed(facts)
                }
            });
            prop_oneof![checkout, subscription, invoice]
        }

        proptest! {
            /// Applying any event twice at the same instant is the same as
            /// applying it once.
            #[test]
            fn merge_is_idempotent(event in arb_event()) {
                let now = Timestamp::from_unix_secs(1_705_276_800).unwrap();
                let mut once = SubscriptionRecord::initialize_trial(
                    SubscriptionId::from_uuid(uuid::Uuid::nil()),
                    AccountId::new("acct-p").unwrap(),
                    now,
                    90,
                );

                if merge(&mut once, &event, now).is_ok() {
                    let mut twice = once.clone();
                    // Second application must either no-op or fail; the
                    // record must not drift.
                    let _ = merge(&mut twice, &event, now);
                    prop_assert_eq!(once, twice);
                }
            }
        }
    }
}
