//! CreatePortalSessionHandler - self-service billing portal access.

use std::sync::Arc;

use crate::domain::foundation::{AccountId, DomainError, ErrorCode};
use crate::ports::{BillingProvider, PortalSession, SubscriptionStore};

/// Command to open a billing portal session.
#[derive(Debug, Clone)]
pub struct CreatePortalSessionCommand {
    pub account_id: AccountId,
    pub return_url: String,
}

/// Handler for billing portal sessions.
///
/// Requires the account to already be a provider customer; the portal is
/// meaningless before first checkout contact.
pub struct CreatePortalSessionHandler {
    store: Arc<dyn SubscriptionStore>,
    provider: Arc<dyn BillingProvider>,
}

impl CreatePortalSessionHandler {
    pub fn new(store: Arc<dyn SubscriptionStore>, provider: Arc<dyn BillingProvider>) -> Self {
        Self { store, provider }
    }

    pub async fn handle(
        &self,
        cmd: CreatePortalSessionCommand,
    ) -> Result<PortalSession, DomainError> {
        let record = self
            .store
            .find_by_account_id(&cmd.account_id)
            .await?
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    "Account has no subscription record",
                )
            })?;

        let customer_id = record.provider_customer_id.as_deref().ok_or_else(|| {
            DomainError::validation(
                "provider_customer_id",
                "Account is not yet a billing customer",
            )
        })?;

        let session = self
            .provider
            .create_portal_session(customer_id, &cmd.return_url)
            .await?;
        Ok(session)
    }
}
