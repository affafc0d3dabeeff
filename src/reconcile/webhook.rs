//! Webhook authenticity and payload extraction.
//!
//! Requests carry an HMAC-SHA256 signature over the raw body, hex-encoded
//! in the `X-Saucier-Signature` header. Comparison is constant-time and
//! case-insensitive (both sides are decoded to bytes first).

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::entitlements::parse_timestamp;
use crate::error::{Result, SaucierError};
use crate::provider::extract_snapshot;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded HMAC-SHA256 of the raw request body.
pub const SIGNATURE_HEADER: &str = "x-saucier-signature";

/// Event types that can change a user's entitlement. Everything else is
/// acknowledged without processing.
const ENTITLEMENT_EVENTS: &[&str] = &[
    "INITIAL_PURCHASE",
    "RENEWAL",
    "PRODUCT_CHANGE",
    "CANCELLATION",
    "UNCANCELLATION",
    "EXPIRATION",
    "BILLING_ISSUE",
    "SUBSCRIPTION_EXTENDED",
    "TRANSFER",
];

#[must_use]
pub fn is_entitlement_event(event_type: &str) -> bool {
    ENTITLEMENT_EVENTS.contains(&event_type)
}

/// Verify the webhook signature against the raw request body.
///
/// # Errors
/// Returns `unauthenticated` on any mismatch or malformed signature.
pub fn verify_signature(secret: &SecretString, payload: &[u8], signature: &str) -> Result<()> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| SaucierError::internal("HMAC key error"))?;
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    // hex::decode accepts both cases, which gives us the case-insensitive
    // compare for free.
    let provided = hex::decode(signature.trim())
        .map_err(|_| SaucierError::unauthenticated("malformed webhook signature"))?;

    if expected.ct_eq(provided.as_slice()).unwrap_u8() != 1 {
        return Err(SaucierError::unauthenticated("invalid webhook signature"));
    }
    Ok(())
}

/// Compute the hex HMAC-SHA256 signature for a payload. Used by tests and
/// local tooling to produce valid webhook requests.
#[must_use]
pub fn compute_signature(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Normalized inbound webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Provider event id, or a content digest of the raw body when the
    /// provider supplied none. Byte-identical redeliveries collapse to the
    /// same id either way.
    pub event_id: String,
    /// Upper-cased event type; empty when the payload had none.
    pub event_type: String,
    pub uid: Option<String>,
    /// Normalized (lowercased) product identifier.
    pub product_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Parse a verified webhook body into an [`InboundEvent`].
///
/// # Errors
/// Returns `invalid-argument` only when the body is not JSON at all. Missing
/// fields inside valid JSON degrade to `None` and are handled downstream.
pub fn parse_event(raw_body: &[u8]) -> Result<InboundEvent> {
    let payload: Value = serde_json::from_slice(raw_body).map_err(|e| {
        tracing::warn!(
            target: "saucier::webhook",
            error = %e,
            "Failed to parse webhook payload"
        );
        SaucierError::invalid_argument("malformed JSON payload")
    })?;

    let event = payload.get("event");

    let event_type = event
        .and_then(|e| e.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_ascii_uppercase();

    let event_id = event
        .and_then(|e| e.get("id"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .unwrap_or_else(|| digest_event_id(raw_body));

    let uid = [
        event.and_then(|e| e.get("app_user_id")),
        payload.get("app_user_id"),
        payload
            .get("subscriber")
            .and_then(|s| s.get("original_app_user_id")),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .map(str::trim)
    .find(|uid| !uid.is_empty())
    .map(String::from);

    let snapshot = payload.get("subscriber").map(extract_snapshot);

    let product_id = event
        .and_then(|e| e.get("product_id"))
        .and_then(Value::as_str)
        .map(|p| p.trim().to_ascii_lowercase())
        .filter(|p| !p.is_empty())
        .or_else(|| snapshot.as_ref().and_then(|s| s.product_id.clone()));

    let expires_at = event
        .and_then(|e| {
            e.get("expiration_at_ms")
                .or_else(|| e.get("expiration_at"))
        })
        .and_then(parse_timestamp)
        .or_else(|| snapshot.as_ref().and_then(|s| s.expires_at));

    Ok(InboundEvent {
        event_id,
        event_type,
        uid,
        product_id,
        expires_at,
    })
}

/// Deterministic event id for payloads without a provider-supplied one.
fn digest_event_id(raw_body: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(raw_body)))
}

/// Outcome of one webhook delivery. All of these are acknowledged with 200;
/// the provider must not retry any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Event admitted and reconciled (the user record may or may not have
    /// changed; the audit entry records which).
    Processed,
    /// Event type not entitlement-affecting, or payload unusable.
    Ignored,
    /// Dedupe marker already existed.
    Duplicate,
    /// No resolvable user id in the payload.
    MissingUser,
}

impl WebhookOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Ignored => "ignored",
            Self::Duplicate => "duplicate",
            Self::MissingUser => "missing_user",
        }
    }
}
