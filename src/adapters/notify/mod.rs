//! Notification adapter.
//!
//! The real email machinery is a separate collaborator; this crate ships a
//! logging implementation of the notifier port so the scheduler and engine
//! can run without it.

mod logging_notifier;

pub use logging_notifier::LoggingNotifier;
