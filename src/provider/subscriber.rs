//! Subscriber payload extraction.
//!
//! The provider's subscriber object is noisy and eventually consistent; this
//! module pulls out the one product/expiry pair reconciliation cares about.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::entitlements::parse_timestamp;

/// The slice of provider subscriber state consumed by reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberSnapshot {
    /// Normalized (lowercased) product identifier, if any entitlement exists.
    pub product_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Extract the active entitlement from a provider `subscriber` object.
///
/// Prefers the `entitlements` map; falls back to raw `subscriptions`. When
/// several are present, a non-expiring entitlement wins, then the one with
/// the latest expiry. Missing or malformed structure degrades to an empty
/// snapshot.
#[must_use]
pub fn extract_snapshot(subscriber: &Value) -> SubscriberSnapshot {
    let mut best: Option<(String, Option<DateTime<Utc>>)> = None;

    if let Some(entitlements) = subscriber.get("entitlements").and_then(Value::as_object) {
        for entitlement in entitlements.values() {
            let Some(product) = entitlement
                .get("product_identifier")
                .and_then(Value::as_str)
            else {
                continue;
            };
            let expires = entitlement.get("expires_date").and_then(parse_timestamp);
            consider(&mut best, product, expires);
        }
    }

    if best.is_none() {
        if let Some(subscriptions) = subscriber.get("subscriptions").and_then(Value::as_object) {
            for (product, subscription) in subscriptions {
                let expires = subscription.get("expires_date").and_then(parse_timestamp);
                consider(&mut best, product, expires);
            }
        }
    }

    match best {
        Some((product_id, expires_at)) => SubscriberSnapshot {
            product_id: Some(product_id),
            expires_at,
        },
        None => SubscriberSnapshot::default(),
    }
}

fn consider(
    best: &mut Option<(String, Option<DateTime<Utc>>)>,
    product: &str,
    expires: Option<DateTime<Utc>>,
) {
    let product = product.trim().to_ascii_lowercase();
    if product.is_empty() {
        return;
    }
    let better = match best.as_ref() {
        None => true,
        // A non-expiring entitlement is already the best possible.
        Some((_, None)) => false,
        Some((_, Some(current))) => match expires {
            None => true,
            Some(candidate) => candidate > *current,
        },
    };
    if better {
        *best = Some((product, expires));
    }
}
