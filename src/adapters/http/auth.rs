//! Bearer-token authentication for the API surface.
//!
//! Session issuance lives in the identity collaborator; this adapter only
//! verifies tokens and extracts the caller's account id. The webhook route
//! deliberately does not pass through here - it authenticates via payload
//! signature instead.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::AuthConfig;
use crate::domain::foundation::{AccountId, DomainError, ErrorCode};

use super::error::ApiError;
use super::routes::AppState;

/// Claims we read from access tokens.
#[derive(Debug, Deserialize)]
struct Claims {
    /// Account id of the caller.
    sub: String,
}

/// Verifies bearer tokens against the configured secret.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[config.audience.clone()]);
        validation.set_issuer(&[config.issuer.clone()]);
        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.expose_secret().as_bytes()),
            validation,
        }
    }

    /// Verifies a token and returns the caller's account id.
    pub fn verify(&self, token: &str) -> Result<AccountId, DomainError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| DomainError::new(ErrorCode::Unauthorized, format!("Invalid token: {}", e)))?;
        AccountId::new(data.claims.sub)
            .map_err(|_| DomainError::new(ErrorCode::Unauthorized, "Token has no usable subject"))
    }
}

/// Extractor yielding the authenticated caller's account id.
#[derive(Debug, Clone)]
pub struct AuthenticatedAccount(pub AccountId);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthenticatedAccount {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ApiError(DomainError::new(
                    ErrorCode::Unauthorized,
                    "Missing Authorization header",
                ))
            })?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError(DomainError::new(
                ErrorCode::Unauthorized,
                "Authorization header is not a bearer token",
            ))
        })?;

        let account_id = state.auth.verify(token)?;
        Ok(AuthenticatedAccount(account_id))
    }
}
