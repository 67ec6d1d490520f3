//! Stripe adapter - billing provider port implementation.

mod client;
mod types;

pub use client::StripeBillingClient;
