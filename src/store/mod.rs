//! Persistence traits for entitlement state.
//!
//! Implement [`EntitlementStore`] against your document store. All record
//! writes are merge/partial-update, never full-document replace, so a
//! reconciliation racing another writer converges instead of clobbering.
//! A memory-backed implementation is provided for development and testing.

use crate::entitlements::{SEED_HASH, Tier};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod memory;

pub use memory::MemoryEntitlementStore;

/// Persistent per-user entitlement record as read from the document store.
///
/// Fields are optional because documents may be partially seeded; a record
/// missing core fields triggers a backfill write on the next reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredEntitlement {
    pub product_id: Option<String>,
    pub tier: Option<Tier>,
    /// External projection: `"active"` or `"inactive"`.
    pub entitlement_status: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub grace_until: Option<DateTime<Utc>>,
    pub is_in_grace: Option<bool>,
    pub entitlement_hash: Option<String>,
    pub last_entitlement_event_at: Option<DateTime<Utc>>,
}

impl StoredEntitlement {
    /// The record seeded at account creation. The sentinel hash guarantees
    /// the first real reconciliation always writes.
    #[must_use]
    pub fn seed() -> Self {
        Self {
            product_id: Some("none".to_string()),
            tier: Some(Tier::None),
            entitlement_status: Some("inactive".to_string()),
            entitlement_hash: Some(SEED_HASH.to_string()),
            ..Self::default()
        }
    }

    /// Whether the fields change detection depends on are all present.
    #[must_use]
    pub fn has_core_fields(&self) -> bool {
        self.tier.is_some() && self.product_id.is_some() && self.entitlement_status.is_some()
    }
}

/// Field set written by a reconciliation pass. Applied as a merge: these
/// fields are set, anything else on the document is left untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitlementWrite {
    pub product_id: String,
    pub tier: Tier,
    pub entitlement_status: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub grace_until: Option<DateTime<Utc>>,
    pub is_in_grace: bool,
    pub entitlement_hash: String,
    pub last_entitlement_event_at: DateTime<Utc>,
}

/// Write-once dedupe marker for an inbound webhook event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub uid: String,
    pub received_at: DateTime<Utc>,
}

/// Where a reconciliation pass originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileSource {
    /// Webhook delivery from the provider.
    Push,
    /// On-demand REST poll against the provider.
    Pull,
}

impl ReconcileSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
        }
    }
}

/// Append-only snapshot of one reconciliation pass, for forensic replay.
///
/// Keyed by event id under the user; a same-key retry overwrites with
/// identical content, so retries stay idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event_id: String,
    pub uid: String,
    pub source: ReconcileSource,
    pub event_type: Option<String>,
    pub product_id: Option<String>,
    pub tier: Tier,
    pub entitlement_status: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub grace_until: Option<DateTime<Utc>>,
    pub prev_hash: Option<String>,
    pub new_hash: String,
    pub wrote: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Trait for persisting entitlement state.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Fetch the entitlement record for a user.
    async fn get_entitlement(&self, uid: &str) -> Result<Option<StoredEntitlement>>;

    /// Merge-upsert the entitlement record for a user.
    ///
    /// Must set exactly the fields in `write` and leave any other document
    /// content in place.
    async fn merge_entitlement(&self, uid: &str, write: &EntitlementWrite) -> Result<()>;

    /// Create the seeded entitlement record if none exists. No-op when a
    /// record is already present.
    async fn seed_entitlement(&self, uid: &str) -> Result<()>;

    /// Atomically claim an inbound event id.
    ///
    /// Returns `true` if this call created the dedupe marker (caller
    /// proceeds), `false` if the marker already existed (caller acknowledges
    /// and stops). Must be atomic against concurrent deliveries of the same
    /// event id.
    async fn claim_event(
        &self,
        event_id: &str,
        uid: &str,
        received_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Append an audit entry under the user, keyed by event id. Same-key
    /// writes replace the existing entry.
    async fn append_audit(&self, uid: &str, entry: &AuditEntry) -> Result<()>;

    /// Read back the audit trail for a user, oldest first.
    async fn list_audit_entries(&self, uid: &str) -> Result<Vec<AuditEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_record_has_core_fields_and_sentinel_hash() {
        let seed = StoredEntitlement::seed();
        assert!(seed.has_core_fields());
        assert_eq!(seed.entitlement_hash.as_deref(), Some(SEED_HASH));
        assert_eq!(seed.tier, Some(Tier::None));
        assert_eq!(seed.entitlement_status.as_deref(), Some("inactive"));
    }

    #[test]
    fn partial_record_lacks_core_fields() {
        let record = StoredEntitlement {
            entitlement_hash: Some("abc".to_string()),
            ..StoredEntitlement::default()
        };
        assert!(!record.has_core_fields());

        let record = StoredEntitlement {
            product_id: Some("none".to_string()),
            entitlement_status: Some("inactive".to_string()),
            tier: None,
            ..StoredEntitlement::default()
        };
        assert!(!record.has_core_fields());
    }
}
