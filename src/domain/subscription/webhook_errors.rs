//! Webhook boundary errors.
//!
//! Only signature failures and malformed payloads ever produce a rejecting
//! response to the provider. Everything after identity resolution is logged
//! and swallowed, because a non-2xx response triggers automatic redelivery
//! and the event is not re-derivable from any other source.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that reject a webhook delivery at the boundary.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signature timestamp is older than the replay window.
    #[error("Signature timestamp too old")]
    StaleTimestamp,

    /// Signature timestamp is in the future beyond clock skew tolerance.
    #[error("Signature timestamp in the future")]
    FutureTimestamp,

    /// Signature header or JSON body could not be parsed.
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

impl WebhookError {
    /// HTTP status returned to the provider.
    ///
    /// All variants are non-retryable client errors; the provider must not
    /// redeliver a payload we can never accept.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature | WebhookError::StaleTimestamp => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::FutureTimestamp | WebhookError::Malformed(_) => StatusCode::BAD_REQUEST,
        }
    }
}
