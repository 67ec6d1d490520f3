//! Ports - contracts between the subscription engine and the outside world.
//!
//! Adapters implement these traits; the domain and application layers depend
//! only on the traits.

mod billing_provider;
mod notifier;
mod subscription_store;

pub use billing_provider::{
    BillingError, BillingErrorCode, BillingProvider, CheckoutSession, CheckoutSessionRequest,
    PortalSession, Price, ProviderCustomer, ProviderSubscription,
};
pub use notifier::{NotifyError, SubscriptionNotifier, TrialReminder};
pub use subscription_store::SubscriptionStore;
