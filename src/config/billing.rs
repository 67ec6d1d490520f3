//! Billing provider configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Billing provider configuration (Stripe)
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Secret API key (sk_test_... or sk_live_...)
    pub api_key: SecretString,

    /// Webhook signing secret (whsec_...)
    pub webhook_secret: SecretString,

    /// Publishable key handed to clients alongside checkout sessions
    pub publishable_key: String,

    /// Price id of the paid plan
    pub price_id: String,

    /// Base URL of the provider API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Request timeout for provider calls, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl BillingConfig {
    /// Check if using test mode keys
    pub fn is_test_mode(&self) -> bool {
        self.api_key.expose_secret().starts_with("sk_test_")
    }

    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.api_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("BILLING_API_KEY"));
        }
        if self.webhook_secret.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("BILLING_WEBHOOK_SECRET"));
        }
        if self.price_id.is_empty() {
            return Err(ValidationError::MissingRequired("BILLING_PRICE_ID"));
        }

        // Verify key prefixes before any call can leak a malformed secret
        if !self.api_key.expose_secret().starts_with("sk_") {
            return Err(ValidationError::InvalidBillingKey);
        }
        if !self.webhook_secret.expose_secret().starts_with("whsec_") {
            return Err(ValidationError::InvalidBillingWebhookSecret);
        }

        Ok(())
    }
}

fn default_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_request_timeout() -> u64 {
    10
}
