//! Praxia - medical practice back end.
//!
//! The load-bearing piece is the subscription lifecycle and
//! billing-reconciliation engine: it keeps the locally-owned subscription
//! record consistent with the billing provider's view of truth despite
//! notifications arriving asynchronously, at-least-once, out of order, and
//! sometimes before the local record knows the provider's identifiers.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
