//! HandleBillingWebhookHandler - the webhook boundary.
//!
//! Verifies the delivery signature, parses the payload into a typed event,
//! and hands it to the reconciliation engine. The response policy is strict:
//! only signature and payload failures reject; once an event is recognized,
//! any processing failure is logged and swallowed, because a non-2xx answer
//! makes the provider redeliver indefinitely and the event cannot be
//! re-derived from anywhere else.

use std::sync::Arc;

use tracing::{error, info};

use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{
    BillingEvent, ReconcileOutcome, ReconciliationEngine, WebhookError, WebhookVerifier,
};

/// Command carrying a raw webhook delivery.
#[derive(Debug, Clone)]
pub struct HandleBillingWebhookCommand {
    pub payload: Vec<u8>,
    /// Raw signature header value.
    pub signature: String,
}

/// Accepted dispositions; all of these answer 200 to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// Event merged into a record (or was a confirmed no-op).
    Applied,
    /// Notice forwarded to the notification collaborator.
    Forwarded,
    /// No record matched; dropped.
    Unmatched,
    /// Unknown event kind; dropped.
    Ignored,
    /// Recognized and resolved, but applying failed. Logged and swallowed.
    Failed,
}

/// Handler for inbound billing webhooks.
pub struct HandleBillingWebhookHandler {
    verifier: WebhookVerifier,
    engine: Arc<ReconciliationEngine>,
}

impl HandleBillingWebhookHandler {
    pub fn new(verifier: WebhookVerifier, engine: Arc<ReconciliationEngine>) -> Self {
        Self { verifier, engine }
    }

    /// Processes one delivery.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError`] only for signature or payload failures -
    /// the sole cases that produce a rejecting response.
    pub async fn handle(
        &self,
        cmd: HandleBillingWebhookCommand,
    ) -> Result<WebhookDisposition, WebhookError> {
        let now = Timestamp::now();
        let envelope = self.verifier.verify(&cmd.payload, &cmd.signature, now)?;

        let event = BillingEvent::from_envelope(&envelope)
            .map_err(|e| WebhookError::Malformed(e.to_string()))?;

        info!(event_id = %envelope.id, kind = event.kind(), "Billing webhook received");

        match self.engine.apply(&event, now).await {
            Ok(ReconcileOutcome::Applied { .. }) => Ok(WebhookDisposition::Applied),
            Ok(ReconcileOutcome::Forwarded { .. }) => Ok(WebhookDisposition::Forwarded),
            Ok(ReconcileOutcome::Unmatched) => Ok(WebhookDisposition::Unmatched),
            Ok(ReconcileOutcome::Ignored { .. }) => Ok(WebhookDisposition::Ignored),
            Err(e) => {
                error!(
                    event_id = %envelope.id,
                    kind = event.kind(),
                    error = %e,
                    "Failed to apply billing event; acknowledging anyway"
                );
                Ok(WebhookDisposition::Failed)
            }
        }
    }
}
