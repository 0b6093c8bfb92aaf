//! Webhook verification and processing.
//!
//! The authority signs each delivery over the raw body. Verification
//! failures are the only condition that returns a non-2xx status;
//! business-level rejects inside event handling are logged and
//! acknowledged, because redelivery cannot change how a permanent
//! condition is handled and a 5xx would put the delivery into the
//! authority's retry loop forever.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::error::BillingError;
use super::reconciler::{EventReconciler, ReconcileOutcome};
use crate::error::Result;

/// Maximum accepted age of a signed delivery, in seconds.
const SIGNATURE_TOLERANCE_SECONDS: i64 = 300;

/// Parsed webhook event envelope.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
    pub created: u64,
}

/// Event payload wrapper.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// Verifies deliveries and routes events into the reconciler.
#[derive(Clone)]
pub struct WebhookProcessor {
    secret: SecretString,
    reconciler: EventReconciler,
}

impl WebhookProcessor {
    #[must_use]
    pub fn new(secret: SecretString, reconciler: EventReconciler) -> Self {
        Self { secret, reconciler }
    }

    /// Verify the signature header against the raw body and parse the
    /// event envelope.
    ///
    /// Header format: `t=<unix seconds>,v1=<hex hmac-sha256>`, signed
    /// over `"<t>.<body>"`. Comparison is constant-time and deliveries
    /// older than the tolerance window are rejected to stop replays.
    pub fn verify_signature(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent> {
        let parts = parse_signature_header(signature)?;

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0) as i64;
        let age = (now - parts.timestamp).abs();
        if age > SIGNATURE_TOLERANCE_SECONDS {
            return Err(BillingError::WebhookTimestampExpired { age_seconds: age }.into());
        }

        let signed_payload = format!("{}.{}", parts.timestamp, String::from_utf8_lossy(payload));
        let expected = compute_signature(self.secret.expose_secret(), signed_payload.as_bytes())?;

        let provided = hex::decode(&parts.signature)
            .map_err(|_| BillingError::InvalidWebhookSignature)?;
        if expected.ct_eq(&provided).unwrap_u8() != 1 {
            return Err(BillingError::InvalidWebhookSignature.into());
        }

        let event: WebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(
                target: "trekmate::billing::webhook",
                error = %e,
                "failed to parse webhook payload"
            );
            BillingError::InvalidWebhookPayload {
                message: "malformed JSON payload".to_string(),
            }
        })?;

        Ok(event)
    }

    /// Verify and process one delivery.
    ///
    /// Returns `Err` only for transport-level problems (signature,
    /// timestamp, unparseable body). Event-handling failures are
    /// swallowed after logging so the endpoint can acknowledge them.
    pub async fn process(&self, payload: &[u8], signature: &str) -> Result<ReconcileOutcome> {
        let event = self.verify_signature(payload, signature)?;

        match self.reconciler.handle_event(&event).await {
            Ok(outcome) => {
                tracing::debug!(
                    target: "trekmate::billing::webhook",
                    event_id = %event.id,
                    event_type = %event.event_type,
                    ?outcome,
                    "webhook processed"
                );
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(
                    target: "trekmate::billing::webhook",
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %err,
                    "event handling failed, acknowledging anyway"
                );
                Ok(ReconcileOutcome::Ignored)
            }
        }
    }
}

struct SignatureParts {
    timestamp: i64,
    signature: String,
}

fn parse_signature_header(header: &str) -> Result<SignatureParts> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            return Err(BillingError::InvalidWebhookPayload {
                message: "invalid signature header format".to_string(),
            }
            .into());
        };
        match key.trim() {
            "t" => timestamp = value.parse().ok(),
            "v1" => signature = Some(value.to_string()),
            // Other schemes may appear alongside v1.
            _ => {}
        }
    }

    match (timestamp, signature) {
        (Some(timestamp), Some(signature)) => Ok(SignatureParts {
            timestamp,
            signature,
        }),
        _ => Err(BillingError::InvalidWebhookSignature.into()),
    }
}

fn compute_signature(secret: &str, payload: &[u8]) -> Result<Vec<u8>> {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| crate::error::AppError::internal("HMAC key error"))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Sign a payload the way the authority would. Used by tests and by the
/// local development event feeder.
#[must_use]
pub fn sign_payload(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let sig = compute_signature(secret, signed_payload.as_bytes()).unwrap_or_default();
    format!("t={},v1={}", timestamp, hex::encode(sig))
}
