//! Canonical entitlement state derivation.
//!
//! [`resolve`] turns a noisy provider snapshot (product id, expiry, event
//! hint) into the canonical entitlement state. It is a pure function of its
//! inputs plus the caller-supplied `now`, so tests inject fixed instants.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::tier::{Tier, map_product_to_tier};

/// Provider event type that signals a payment problem. It forces the
/// entitlement to `expired` even when a grace window would otherwise apply.
pub const BILLING_ISSUE_EVENT: &str = "BILLING_ISSUE";

/// Internal entitlement status. Externally narrowed to active/inactive via
/// [`EntitlementStatus::as_external`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    Active,
    Expired,
    #[default]
    None,
}

impl EntitlementStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::None => "none",
        }
    }

    /// The two-valued projection stored on the user record and returned to
    /// clients.
    #[must_use]
    pub fn as_external(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired | Self::None => "inactive",
        }
    }
}

impl std::fmt::Display for EntitlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ephemeral inputs for one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileContext {
    pub expires_at: Option<DateTime<Utc>>,
    pub event_type: Option<String>,
    pub grace_days: u32,
}

/// Computed entitlement state. Never stored as-is, only projected onto the
/// persistent user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Normalized (lowercased) product identifier, if any.
    pub product_id: Option<String>,
    pub tier: Tier,
    pub entitlement_status: EntitlementStatus,
    pub expires_at: Option<DateTime<Utc>>,
    /// Grace deadline. Set only when the tier is paid, the expiry is in the
    /// past, and the grace window is nonzero.
    pub grace_until: Option<DateTime<Utc>>,
    pub event_type: Option<String>,
}

impl ReconcileResult {
    /// Whether access is currently granted only by the grace window.
    #[must_use]
    pub fn is_in_grace(&self, now: DateTime<Utc>) -> bool {
        self.entitlement_status == EntitlementStatus::Active
            && self.grace_until.is_some_and(|deadline| now < deadline)
    }
}

/// Derive the canonical entitlement state for one user.
#[must_use]
pub fn resolve(
    product_id: Option<&str>,
    ctx: &ReconcileContext,
    now: DateTime<Utc>,
) -> ReconcileResult {
    let product_id = product_id
        .map(|p| p.trim().to_ascii_lowercase())
        .filter(|p| !p.is_empty());
    let tier = map_product_to_tier(product_id.as_deref());

    if tier == Tier::None {
        return ReconcileResult {
            product_id,
            tier,
            entitlement_status: EntitlementStatus::None,
            expires_at: ctx.expires_at,
            grace_until: None,
            event_type: ctx.event_type.clone(),
        };
    }

    let mut status = EntitlementStatus::Active;
    let mut grace_until = None;

    if let Some(expires_at) = ctx.expires_at {
        if expires_at <= now {
            status = EntitlementStatus::Expired;
            if ctx.grace_days > 0 {
                let deadline = expires_at + Duration::days(i64::from(ctx.grace_days));
                grace_until = Some(deadline);
                if deadline > now {
                    // Still inside the grace window.
                    status = EntitlementStatus::Active;
                }
            }
        }
    }

    // Billing problems override grace: the provider told us renewal is
    // failing, so access stops now.
    let billing_issue = ctx
        .event_type
        .as_deref()
        .is_some_and(|t| t.eq_ignore_ascii_case(BILLING_ISSUE_EVENT));
    if billing_issue && status == EntitlementStatus::Active {
        status = EntitlementStatus::Expired;
    }

    ReconcileResult {
        product_id,
        tier,
        entitlement_status: status,
        expires_at: ctx.expires_at,
        grace_until,
        event_type: ctx.event_type.clone(),
    }
}

/// Defensively parse a timestamp out of a provider payload field.
///
/// Accepts RFC 3339 strings, epoch seconds, and epoch milliseconds (numeric
/// or string-encoded). Unparseable input degrades to `None` rather than an
/// error so one bad field never blocks reconciliation.
#[must_use]
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(epoch_to_datetime),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return Some(parsed.with_timezone(&Utc));
            }
            s.parse::<i64>().ok().and_then(epoch_to_datetime)
        }
        _ => None,
    }
}

fn epoch_to_datetime(raw: i64) -> Option<DateTime<Utc>> {
    // Epoch seconds never reach 12 digits before the year 5000, so anything
    // at or above this magnitude is milliseconds.
    const MILLIS_THRESHOLD: i64 = 100_000_000_000;
    if raw.abs() >= MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn ctx(
        expires_at: Option<DateTime<Utc>>,
        event_type: Option<&str>,
        grace_days: u32,
    ) -> ReconcileContext {
        ReconcileContext {
            expires_at,
            event_type: event_type.map(String::from),
            grace_days,
        }
    }

    #[test]
    fn unknown_product_yields_none_status() {
        let now = fixed_now();
        let result = resolve(
            Some("mystery_sku"),
            &ctx(Some(now - Duration::days(30)), Some("EXPIRATION"), 3),
            now,
        );
        assert_eq!(result.tier, Tier::None);
        assert_eq!(result.entitlement_status, EntitlementStatus::None);
        assert_eq!(result.grace_until, None);
    }

    #[test]
    fn future_expiry_is_active() {
        let now = fixed_now();
        let result = resolve(
            Some("master_chef_yearly"),
            &ctx(Some(now + Duration::days(200)), None, 3),
            now,
        );
        assert_eq!(result.tier, Tier::MasterChef);
        assert_eq!(result.entitlement_status, EntitlementStatus::Active);
        assert_eq!(result.grace_until, None);
        assert!(!result.is_in_grace(now));
    }

    #[test]
    fn missing_expiry_is_active() {
        let now = fixed_now();
        let result = resolve(Some("home_chef_monthly"), &ctx(None, None, 3), now);
        assert_eq!(result.entitlement_status, EntitlementStatus::Active);
    }

    #[test]
    fn recent_expiry_inside_grace_stays_active() {
        let now = fixed_now();
        let expired = now - Duration::days(1);
        let result = resolve(
            Some("home_chef_monthly"),
            &ctx(Some(expired), Some("EXPIRATION"), 3),
            now,
        );
        assert_eq!(result.entitlement_status, EntitlementStatus::Active);
        assert_eq!(result.grace_until, Some(expired + Duration::days(3)));
        assert!(result.is_in_grace(now));
    }

    #[test]
    fn expiry_past_grace_is_expired() {
        let now = fixed_now();
        let expired = now - Duration::days(5);
        let result = resolve(
            Some("home_chef_monthly"),
            &ctx(Some(expired), Some("EXPIRATION"), 3),
            now,
        );
        assert_eq!(result.entitlement_status, EntitlementStatus::Expired);
        assert_eq!(result.grace_until, Some(expired + Duration::days(3)));
        assert!(!result.is_in_grace(now));
    }

    #[test]
    fn zero_grace_days_means_no_grace() {
        let now = fixed_now();
        let result = resolve(
            Some("home_chef_monthly"),
            &ctx(Some(now - Duration::hours(1)), None, 0),
            now,
        );
        assert_eq!(result.entitlement_status, EntitlementStatus::Expired);
        assert_eq!(result.grace_until, None);
    }

    #[test]
    fn billing_issue_overrides_grace() {
        let now = fixed_now();
        let expired = now - Duration::days(1);
        let result = resolve(
            Some("master_chef_monthly"),
            &ctx(Some(expired), Some(BILLING_ISSUE_EVENT), 3),
            now,
        );
        assert_eq!(result.entitlement_status, EntitlementStatus::Expired);
        // The grace deadline is still recorded, but it no longer grants
        // access.
        assert_eq!(result.grace_until, Some(expired + Duration::days(3)));
        assert!(!result.is_in_grace(now));
    }

    #[test]
    fn billing_issue_overrides_active_subscription() {
        let now = fixed_now();
        let result = resolve(
            Some("master_chef_monthly"),
            &ctx(Some(now + Duration::days(20)), Some("billing_issue"), 3),
            now,
        );
        assert_eq!(result.entitlement_status, EntitlementStatus::Expired);
    }

    #[test]
    fn product_id_is_normalized() {
        let now = fixed_now();
        let result = resolve(Some("  Master_Chef_Yearly "), &ctx(None, None, 3), now);
        assert_eq!(result.product_id.as_deref(), Some("master_chef_yearly"));
        assert_eq!(result.tier, Tier::MasterChef);
    }

    #[test]
    fn parse_timestamp_accepts_common_encodings() {
        let expected = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        assert_eq!(
            parse_timestamp(&json!("2024-06-15T12:00:00Z")),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp(&json!("2024-06-15T14:00:00+02:00")),
            Some(expected)
        );
        assert_eq!(parse_timestamp(&json!(1718452800)), Some(expected));
        assert_eq!(parse_timestamp(&json!(1_718_452_800_000_i64)), Some(expected));
        assert_eq!(parse_timestamp(&json!("1718452800000")), Some(expected));
    }

    #[test]
    fn parse_timestamp_degrades_to_none() {
        assert_eq!(parse_timestamp(&json!("next tuesday")), None);
        assert_eq!(parse_timestamp(&json!("")), None);
        assert_eq!(parse_timestamp(&json!(null)), None);
        assert_eq!(parse_timestamp(&json!({"nested": true})), None);
    }

    #[test]
    fn external_status_projection() {
        assert_eq!(EntitlementStatus::Active.as_external(), "active");
        assert_eq!(EntitlementStatus::Expired.as_external(), "inactive");
        assert_eq!(EntitlementStatus::None.as_external(), "inactive");
    }
}
