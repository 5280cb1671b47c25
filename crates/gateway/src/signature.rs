//! Stripe-compatible webhook signatures.
//!
//! The `Stripe-Signature` header has the form `t=<unix seconds>,v1=<hex>`,
//! possibly with several `v1` entries during secret rotation. The signed
//! payload is `"<t>.<raw body>"`, authenticated with HMAC-SHA256.

use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::{GatewayError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Default maximum age of a signed timestamp.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Builds a signature header for a payload. Used by tests and tooling that
/// need to produce deliveries the verifier accepts.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let signature = compute_signature(payload, secret, timestamp)?;
    Ok(format!("t={timestamp},v1={signature}"))
}

fn compute_signature(payload: &[u8], secret: &str, timestamp: i64) -> Result<String> {
    let mac = mac_for(payload, secret, timestamp)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn mac_for(payload: &[u8], secret: &str, timestamp: i64) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::InvalidSignature(format!("invalid secret: {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Verifies a signature header against a payload.
///
/// `now` is the current unix time in seconds; timestamps further than
/// `tolerance` from it are rejected.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance: Duration,
    now: i64,
) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(value.parse().map_err(|_| {
                    GatewayError::InvalidSignature("timestamp is not a number".to_string())
                })?)
            }
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| GatewayError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(GatewayError::InvalidSignature(
            "missing v1 signature".to_string(),
        ));
    }

    let age = now.saturating_sub(timestamp).unsigned_abs();
    if age > tolerance.as_secs() {
        return Err(GatewayError::InvalidSignature(
            "timestamp outside tolerance".to_string(),
        ));
    }

    let mut matched = false;
    for candidate in signatures {
        let Ok(bytes) = hex::decode(candidate) else {
            continue;
        };
        if mac_for(payload, secret, timestamp)?
            .verify_slice(&bytes)
            .is_ok()
        {
            matched = true;
            break;
        }
    }

    if matched {
        Ok(())
    } else {
        Err(GatewayError::InvalidSignature(
            "signature mismatch".to_string(),
        ))
    }
}

/// A verified gateway event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebhookEvent {
    /// Gateway event id, used for de-duplication.
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

impl WebhookEvent {
    /// Returns the payment intent id the event refers to.
    ///
    /// Intent events carry it as `object.id`; charge events as
    /// `object.payment_intent`.
    pub fn intent_id(&self) -> Option<&str> {
        let object = &self.data.object;
        if self.event_type.starts_with("payment_intent.") {
            object.get("id").and_then(|v| v.as_str())
        } else {
            object.get("payment_intent").and_then(|v| v.as_str())
        }
    }
}

/// Checks webhook deliveries and parses them into events.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Option<String>,
    tolerance: Duration,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

impl WebhookVerifier {
    /// Creates a verifier. With no secret every delivery is rejected.
    pub fn new(secret: Option<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            tolerance,
        }
    }

    /// Verifies the signature and parses the event.
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<WebhookEvent> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Same as [`verify`](Self::verify) with an explicit current time.
    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<WebhookEvent> {
        let secret = self
            .secret
            .as_deref()
            .ok_or(GatewayError::MissingWebhookSecret)?;
        verify_signature(payload, header, secret, self.tolerance, now)?;
        Ok(serde_json::from_slice(payload)?)
    }
}
