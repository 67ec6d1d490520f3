//! Shared in-memory fakes for handler tests.
//!
//! The store mirrors the Postgres adapter's optimistic version semantics so
//! handler tests exercise the same conflict behavior the engine sees in
//! production.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::foundation::{AccountId, DomainError, ErrorCode, SubscriptionId, Timestamp};
use crate::domain::subscription::{SubscriptionRecord, SubscriptionStatus};
use crate::ports::{
    BillingError, BillingProvider, CheckoutSession, CheckoutSessionRequest, NotifyError,
    PortalSession, Price, ProviderCustomer, ProviderSubscription, SubscriptionNotifier,
    SubscriptionStore, TrialReminder,
};
use crate::domain::subscription::ProviderSubscriptionStatus;

/// In-memory subscription store keyed by account id.
pub struct MemoryStore {
    records: Mutex<HashMap<String, SubscriptionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_record(record: SubscriptionRecord) -> Self {
        let store = Self::new();
        store
            .records
            .lock()
            .unwrap()
            .insert(record.account_id.to_string(), record);
        store
    }

    pub fn get(&self, account: &str) -> Option<SubscriptionRecord> {
        self.records.lock().unwrap().get(account).cloned()
    }

    pub fn put(&self, record: SubscriptionRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.account_id.to_string(), record);
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
        Ok(self.get(account_id.as_str()))
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
        let mut hits: Vec<SubscriptionRecord> = records
            .values()
            .filter(|r| {
                r.status == SubscriptionStatus::Trial
                    && r.trial_end.map(|end| end.is_before(&cutoff)).unwrap_or(false)
            })
            .cloned()
            .collect();
        hits.sort_by_key(|r| r.trial_end);
        Ok(hits)
    }

    async fn find_trials_ending_between(
        &self,
        from: Timestamp,
        until: Timestamp,
    ) -> Result<Vec<SubscriptionRecord>, DomainError> {
        let records = self.records.lock().unwrap();
        let mut hits: Vec<SubscriptionRecord> = records
            .values()
            .filter(|r| {
                r.status == SubscriptionStatus::Trial
                    && r.trial_end
                        .map(|end| !end.is_before(&from) && end.is_before(&until))
                        .unwrap_or(false)
            })
            .cloned()
            .collect();
        hits.sort_by_key(|r| r.trial_end);
        Ok(hits)
    }
}

/// Notifier fake that records deliveries and can fail per account.
pub struct MemoryNotifier {
    pub sent: Mutex<Vec<TrialReminder>>,
    pub notices: Mutex<Vec<AccountId>>,
    failing_accounts: Mutex<HashSet<String>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
            failing_accounts: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_for(&self, account: &str) {
        self.failing_accounts
            .lock()
            .unwrap()
            .insert(account.to_string());
    }

    pub fn reminders(&self) -> Vec<TrialReminder> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubscriptionNotifier for MemoryNotifier {
    async fn send_trial_reminder(&self, reminder: TrialReminder) -> Result<(), NotifyError> {
        if self
            .failing_accounts
            .lock()
            .unwrap()
            .contains(reminder.account_id.as_str())
        {
            return Err(NotifyError::Dispatch("mailbox on fire".to_string()));
        }
        self.sent.lock().unwrap().push(reminder);
        Ok(())
    }

    async fn send_provider_trial_notice(&self, account_id: &AccountId) -> Result<(), NotifyError> {
        if self
            .failing_accounts
            .lock()
            .unwrap()
            .contains(account_id.as_str())
        {
            return Err(NotifyError::Dispatch("mailbox on fire".to_string()));
        }
        self.notices.lock().unwrap().push(account_id.clone());
        Ok(())
    }
}

/// What the provider fake was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    CreateCustomer(String),
    CreateCheckout { customer_id: String, account_id: String },
    CreatePortal(String),
    Cancel { subscription_id: String, at_period_end: bool },
}

/// Billing provider fake.
pub struct MemoryProvider {
    pub calls: Mutex<Vec<ProviderCall>>,
    fail_next: Mutex<Option<BillingError>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
        }
    }

    pub fn fail_next(&self, err: BillingError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    fn take_failure(&self) -> Result<(), BillingError> {
        match self.fail_next.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BillingProvider for MemoryProvider {
    async fn create_customer(
        &self,
        account_id: &AccountId,
        email: &str,
    ) -> Result<ProviderCustomer, BillingError> {
        self.take_failure()?;
        self.calls
            .lock()
            .unwrap()
            .push(ProviderCall::CreateCustomer(account_id.to_string()));
        Ok(ProviderCustomer {
            id: format!("cus_{}", account_id),
            email: Some(email.to_string()),
        })
    }

    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, BillingError> {
        self.take_failure()?;
        self.calls.lock().unwrap().push(ProviderCall::CreateCheckout {
            customer_id: request.customer_id.clone(),
            account_id: request.account_id.to_string(),
        });
        Ok(CheckoutSession {
            id: "cs_test_1".to_string(),
            url: "https://checkout.example/cs_test_1".to_string(),
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        _return_url: &str,
    ) -> Result<PortalSession, BillingError> {
        self.take_failure()?;
        self.calls
            .lock()
            .unwrap()
            .push(ProviderCall::CreatePortal(customer_id.to_string()));
        Ok(PortalSession {
            id: "bps_test_1".to_string(),
            url: "https://portal.example/bps_test_1".to_string(),
        })
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, BillingError> {
        self.take_failure()?;
        Ok(ProviderSubscription {
            id: subscription_id.to_string(),
            customer_id: "cus_1".to_string(),
            status: ProviderSubscriptionStatus::Active,
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
        })
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<ProviderSubscription, BillingError> {
        self.take_failure()?;
        self.calls.lock().unwrap().push(ProviderCall::Cancel {
            subscription_id: subscription_id.to_string(),
            at_period_end,
        });
        Ok(ProviderSubscription {
            id: subscription_id.to_string(),
            customer_id: "cus_1".to_string(),
            status: if at_period_end {
                ProviderSubscriptionStatus::Active
            } else {
                ProviderSubscriptionStatus::Canceled
            },
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: at_period_end,
        })
    }

    async fn get_price(&self) -> Result<Price, BillingError> {
        self.take_failure()?;
        Ok(Price {
            id: "price_1".to_string(),
            unit_amount: Some(4900),
            currency: "eur".to_string(),
        })
    }
}
