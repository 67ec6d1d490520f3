//! Authentication configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Authentication configuration (JWT bearer tokens)
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for verifying bearer tokens
    pub jwt_secret: SecretString,

    /// Expected token audience
    #[serde(default = "default_audience")]
    pub audience: String,

    /// Expected token issuer
    #[serde(default = "default_issuer")]
    pub issuer: String,
}

impl AuthConfig {
    /// Validate auth configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.jwt_secret.expose_secret().is_empty() {
            return Err(ValidationError::MissingJwtSecret);
        }
        Ok(())
    }
}

fn default_audience() -> String {
    "praxia".to_string()
}

fn default_issuer() -> String {
    "praxia".to_string()
}
