//! Stripe billing provider adapter.
//!
//! Implements the `BillingProvider` port over Stripe's form-encoded HTTP API
//! with `reqwest`. The client is an explicitly constructed instance holding
//! its own credentials; there is no process-wide API-key state. Every request
//! carries the configured finite timeout so a slow provider call can never
//! wedge a caller.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::config::BillingConfig;
use crate::domain::foundation::AccountId;
use crate::domain::subscription::ACCOUNT_METADATA_KEY;
use crate::ports::{
    BillingError, BillingErrorCode, BillingProvider, CheckoutSession, CheckoutSessionRequest,
    PortalSession, Price, ProviderCustomer, ProviderSubscription,
};

use super::types::{
    StripeCheckoutSession, StripeCustomer, StripeErrorEnvelope, StripePortalSession, StripePrice,
    StripeSubscription,
};

/// Stripe implementation of the billing provider port.
pub struct StripeBillingClient {
    config: BillingConfig,
    http: reqwest::Client,
}

impl StripeBillingClient {
    /// Creates a client from billing configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: BillingConfig) -> Result<Self, BillingError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BillingError::network(format!("HTTP client construction: {}", e)))?;
        Ok(Self { config, http })
    }

    /// Publishable key handed to clients alongside checkout sessions.
    pub fn publishable_key(&self) -> &str {
        &self.config.publishable_key
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base, path)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, BillingError> {
        let response = self
            .http
            .post(self.url(path))
            .bearer_auth(self.config.api_key.expose_secret())
            .form(form)
            .send()
            .await
            .map_err(request_error)?;
        decode_response(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, BillingError> {
        let response = self
            .http
            .get(self.url(path))
            .bearer_auth(self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(request_error)?;
        decode_response(response).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, BillingError> {
        let response = self
            .http
            .delete(self.url(path))
            .bearer_auth(self.config.api_key.expose_secret())
            .send()
            .await
            .map_err(request_error)?;
        decode_response(response).await
    }
}

fn request_error(err: reqwest::Error) -> BillingError {
    if err.is_timeout() {
        BillingError::network(format!("Provider request timed out: {}", err))
    } else {
        BillingError::network(format!("Provider request failed: {}", err))
    }
}

/// Maps a provider response to the port's error taxonomy, preserving the
/// provider's own message for the caller.
async fn decode_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, BillingError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| BillingError::api(format!("Malformed provider response: {}", e)));
    }

    let code = match status.as_u16() {
        401 | 403 => BillingErrorCode::Authentication,
        404 => BillingErrorCode::NotFound,
        429 => BillingErrorCode::RateLimited,
        _ => BillingErrorCode::Api,
    };

    let message = match response.json::<StripeErrorEnvelope>().await {
        Ok(envelope) => envelope
            .error
            .message
            .or(envelope.error.error_type)
            .unwrap_or_else(|| format!("HTTP {}", status)),
        Err(_) => format!("HTTP {}", status),
    };

    warn!(status = %status, message = %message, "Billing provider call failed");
    Err(BillingError::new(code, message))
}

fn metadata_field(account_id: &AccountId) -> (String, String) {
    (
        format!("metadata[{}]", ACCOUNT_METADATA_KEY),
        account_id.to_string(),
    )
}

#[async_trait]
impl BillingProvider for StripeBillingClient {
    async fn create_customer(
        &self,
        account_id: &AccountId,
        email: &str,
    ) -> Result<ProviderCustomer, BillingError> {
        let form = vec![
            ("email".to_string(), email.to_string()),
            metadata_field(account_id),
        ];
        let customer: StripeCustomer = self.post_form("/v1/customers", &form).await?;
        Ok(customer.into())
    }

    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, BillingError> {
        // The account id rides along in both session and subscription
        // metadata so a webhook for either object can resolve it.
        let form = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("customer".to_string(), request.customer_id),
            (
                "line_items[0][price]".to_string(),
                self.config.price_id.clone(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), request.success_url),
            ("cancel_url".to_string(), request.cancel_url),
            metadata_field(&request.account_id),
            (
                format!("subscription_data[metadata][{}]", ACCOUNT_METADATA_KEY),
                request.account_id.to_string(),
            ),
        ];
        let session: StripeCheckoutSession = self.post_form("/v1/checkout/sessions", &form).await?;
        let url = session
            .url
            .ok_or_else(|| BillingError::api("Checkout session has no redirect URL"))?;
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, BillingError> {
        let form = vec![
            ("customer".to_string(), customer_id.to_string()),
            ("return_url".to_string(), return_url.to_string()),
        ];
        let session: StripePortalSession =
            self.post_form("/v1/billing_portal/sessions", &form).await?;
        Ok(PortalSession {
            id: session.id,
            url: session.url,
        })
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, BillingError> {
        let subscription: StripeSubscription = self
            .get(&format!("/v1/subscriptions/{}", subscription_id))
            .await?;
        Ok(subscription.into())
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<ProviderSubscription, BillingError> {
        let subscription: StripeSubscription = if at_period_end {
            let form = vec![("cancel_at_period_end".to_string(), "true".to_string())];
            self.post_form(&format!("/v1/subscriptions/{}", subscription_id), &form)
                .await?
        } else {
            self.delete(&format!("/v1/subscriptions/{}", subscription_id))
                .await?
        };
        Ok(subscription.into())
    }

    async fn get_price(&self) -> Result<Price, BillingError> {
        let price: StripePrice = self
            .get(&format!("/v1/prices/{}", self.config.price_id))
            .await?;
        Ok(price.into())
    }
}
