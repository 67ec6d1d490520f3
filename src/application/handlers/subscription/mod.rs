//! Subscription command and query handlers.

mod cancel_subscription;
mod check_access;
mod create_portal;
mod expire_trials;
mod handle_billing_webhook;
mod initialize_trial;
mod send_trial_reminders;
mod start_checkout;

#[cfg(test)]
pub mod test_support;

pub use cancel_subscription::{
    CancelOutcome, CancelSubscriptionCommand, CancelSubscriptionHandler,
};
pub use check_access::{CheckAccessHandler, CheckAccessQuery};
pub use create_portal::{CreatePortalSessionCommand, CreatePortalSessionHandler};
pub use expire_trials::{ExpireTrialsHandler, ExpirySweepReport};
pub use handle_billing_webhook::{
    HandleBillingWebhookCommand, HandleBillingWebhookHandler, WebhookDisposition,
};
pub use initialize_trial::{InitializeTrialCommand, InitializeTrialHandler};
pub use send_trial_reminders::{ReminderSweepReport, TrialRemindersHandler};
pub use start_checkout::{CheckoutRedirect, StartCheckoutCommand, StartCheckoutHandler};
