//! Entitlement change detection.
//!
//! The persisted record carries a digest of the user-visible entitlement
//! semantics. A reconciliation pass writes only when the digest moves, so
//! replaying the same provider state is a no-op on the user record.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::resolver::{EntitlementStatus, ReconcileResult};
use super::tier::Tier;

/// Sentinel hash written when a user record is seeded at account creation.
/// It never equals a real digest, so the first reconciliation always writes.
pub const SEED_HASH: &str = "seed";

/// Deterministic digest of the four semantic entitlement fields.
///
/// The canonical form fixes field order and normalizes the product id
/// (lowercased, `"none"` sentinel) and the grace deadline (epoch
/// milliseconds), so logically identical states hash identically regardless
/// of input field ordering or timestamp encoding.
#[must_use]
pub fn entitlement_hash(
    product_id: Option<&str>,
    tier: Tier,
    status: EntitlementStatus,
    grace_until: Option<DateTime<Utc>>,
) -> String {
    let product = product_id
        .map(|p| p.trim().to_ascii_lowercase())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "none".to_string());
    let grace = grace_until
        .map(|g| g.timestamp_millis().to_string())
        .unwrap_or_else(|| "null".to_string());

    let canonical = format!(
        "product={product}\ntier={}\nstatus={}\ngrace={grace}",
        tier.as_str(),
        status.as_external(),
    );

    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Digest of a computed [`ReconcileResult`].
#[must_use]
pub fn hash_result(result: &ReconcileResult) -> String {
    entitlement_hash(
        result.product_id.as_deref(),
        result.tier,
        result.entitlement_status,
        result.grace_until,
    )
}

/// Decide whether the derived state must be persisted.
///
/// Writes happen when the digest moved, when no record exists yet, or when
/// the stored record is missing core fields (backfill). The backfill clause
/// guards against partially-seeded records produced by races at
/// account-creation time.
#[must_use]
pub fn should_write(
    prev_hash: Option<&str>,
    new_hash: &str,
    record_exists: bool,
    record_has_core_fields: bool,
) -> bool {
    if !record_exists || !record_has_core_fields {
        return true;
    }
    prev_hash != Some(new_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hash_is_deterministic() {
        let grace = Utc.with_ymd_and_hms(2024, 6, 18, 0, 0, 0).unwrap();
        let a = entitlement_hash(
            Some("home_chef_monthly"),
            Tier::HomeChef,
            EntitlementStatus::Active,
            Some(grace),
        );
        let b = entitlement_hash(
            Some("home_chef_monthly"),
            Tier::HomeChef,
            EntitlementStatus::Active,
            Some(grace),
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_normalizes_product_case_and_absence() {
        let a = entitlement_hash(
            Some("Master_Chef_Yearly"),
            Tier::MasterChef,
            EntitlementStatus::Active,
            None,
        );
        let b = entitlement_hash(
            Some("master_chef_yearly"),
            Tier::MasterChef,
            EntitlementStatus::Active,
            None,
        );
        assert_eq!(a, b);

        let absent = entitlement_hash(None, Tier::None, EntitlementStatus::None, None);
        let sentinel = entitlement_hash(Some("none"), Tier::None, EntitlementStatus::None, None);
        assert_eq!(absent, sentinel);
    }

    #[test]
    fn hash_normalizes_timestamp_representation() {
        // Same instant constructed two different ways.
        let from_parts = Utc.with_ymd_and_hms(2024, 6, 18, 9, 30, 0).unwrap();
        let from_millis = Utc
            .timestamp_millis_opt(from_parts.timestamp_millis())
            .unwrap();
        let a = entitlement_hash(
            Some("home_chef_monthly"),
            Tier::HomeChef,
            EntitlementStatus::Active,
            Some(from_parts),
        );
        let b = entitlement_hash(
            Some("home_chef_monthly"),
            Tier::HomeChef,
            EntitlementStatus::Active,
            Some(from_millis),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn hash_moves_when_semantics_change() {
        let base = entitlement_hash(
            Some("home_chef_monthly"),
            Tier::HomeChef,
            EntitlementStatus::Active,
            None,
        );
        let expired = entitlement_hash(
            Some("home_chef_monthly"),
            Tier::HomeChef,
            EntitlementStatus::Expired,
            None,
        );
        assert_ne!(base, expired);
    }

    #[test]
    fn seed_hash_never_matches_a_real_digest() {
        let real = entitlement_hash(None, Tier::None, EntitlementStatus::None, None);
        assert_ne!(real, SEED_HASH);
    }

    #[test]
    fn should_write_on_hash_change() {
        assert!(should_write(Some("aaa"), "bbb", true, true));
        assert!(!should_write(Some("aaa"), "aaa", true, true));
    }

    #[test]
    fn should_write_when_record_missing() {
        assert!(should_write(None, "aaa", false, false));
    }

    #[test]
    fn should_write_backfills_partial_records() {
        // Equal hashes, but the stored record lacks core fields.
        assert!(should_write(Some("aaa"), "aaa", true, false));
    }
}
