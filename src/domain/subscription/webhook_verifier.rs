//! Webhook signature verification.
//!
//! The provider signs each delivery with HMAC-SHA256 over
//! `"{timestamp}.{raw_body}"` using a shared secret, and sends the result in
//! a header of the form `t=<unix>,v1=<hex>[,v1=<hex>...]`. Verification uses
//! constant-time comparison and bounds the timestamp to defeat replays.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::foundation::Timestamp;

use super::provider_event::ProviderEventEnvelope;
use super::webhook_errors::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed delivery (replay window).
const MAX_SIGNATURE_AGE_SECS: i64 = 300;

/// Tolerance for provider clocks running ahead of ours.
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp the provider signed.
    pub timestamp: i64,
    /// All v1 signatures present (the provider sends several during secret
    /// rotation; any one matching is sufficient).
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses a `t=...,v1=...` header.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                return Err(WebhookError::Malformed(
                    "signature header segment without '='".to_string(),
                ));
            };
            match key {
                "t" => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        WebhookError::Malformed("non-numeric signature timestamp".to_string())
                    })?);
                }
                "v1" => {
                    let bytes = hex::decode(value).map_err(|_| {
                        WebhookError::Malformed("v1 signature is not hex".to_string())
                    })?;
                    v1_signatures.push(bytes);
                }
                // Unknown schemes (v0, future versions) are skipped.
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| WebhookError::Malformed("missing signature timestamp".to_string()))?;
        if v1_signatures.is_empty() {
            return Err(WebhookError::Malformed("missing v1 signature".to_string()));
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

/// Verifies webhook deliveries against the shared signing secret.
pub struct WebhookVerifier {
    secret: SecretString,
}

impl WebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verifies the signature and parses the body into an event envelope.
    ///
    /// # Errors
    ///
    /// - [`WebhookError::StaleTimestamp`] / [`WebhookError::FutureTimestamp`]
    ///   when the signed timestamp falls outside the replay window
    /// - [`WebhookError::InvalidSignature`] when no v1 signature matches
    /// - [`WebhookError::Malformed`] for header or JSON parse failures
    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: Timestamp,
    ) -> Result<ProviderEventEnvelope, WebhookError> {
        let header = SignatureHeader::parse(signature_header)?;
        self.check_timestamp(header.timestamp, now)?;

        let expected = self.sign(header.timestamp, payload);
        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| constant_time_eq(&expected, candidate));
        if !matched {
            return Err(WebhookError::InvalidSignature);
        }

        serde_json::from_slice(payload).map_err(|e| WebhookError::Malformed(e.to_string()))
    }

    fn check_timestamp(&self, signed_at: i64, now: Timestamp) -> Result<(), WebhookError> {
        let age = now.as_unix_secs() - signed_at;
        if age > MAX_SIGNATURE_AGE_SECS {
            return Err(WebhookError::StaleTimestamp);
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(WebhookError::FutureTimestamp);
        }
        Ok(())
    }

    fn sign(&self, timestamp: i64, payload: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Builds a valid signature header for a payload; test fixtures only.
#[cfg(test)]
pub fn sign_for_tests(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
