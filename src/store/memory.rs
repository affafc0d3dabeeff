//! Memory-backed entitlement store.
//!
//! Suitable for development and tests. In production, implement
//! [`EntitlementStore`] against a document store whose create operation can
//! fail on conflict, so `claim_event` stays atomic across instances.

use super::{AuditEntry, EntitlementStore, EntitlementWrite, ProcessedEvent, StoredEntitlement};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory [`EntitlementStore`]. Wraps its data in `Arc` for cheap cloning.
#[derive(Default, Clone)]
pub struct MemoryEntitlementStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    entitlements: RwLock<HashMap<String, StoredEntitlement>>,
    processed_events: RwLock<HashMap<String, ProcessedEvent>>,
    audits: RwLock<HashMap<String, Vec<AuditEntry>>>,
}

impl MemoryEntitlementStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dedupe markers created so far (for tests).
    pub async fn processed_event_count(&self) -> usize {
        self.inner.processed_events.read().await.len()
    }

    /// Insert a record verbatim, bypassing merge semantics. Lets tests set
    /// up partially-seeded documents.
    pub async fn insert_record(&self, uid: &str, record: StoredEntitlement) {
        self.inner
            .entitlements
            .write()
            .await
            .insert(uid.to_string(), record);
    }
}

#[async_trait]
impl EntitlementStore for MemoryEntitlementStore {
    async fn get_entitlement(&self, uid: &str) -> Result<Option<StoredEntitlement>> {
        Ok(self.inner.entitlements.read().await.get(uid).cloned())
    }

    async fn merge_entitlement(&self, uid: &str, write: &EntitlementWrite) -> Result<()> {
        let mut entitlements = self.inner.entitlements.write().await;
        let record = entitlements.entry(uid.to_string()).or_default();
        record.product_id = Some(write.product_id.clone());
        record.tier = Some(write.tier);
        record.entitlement_status = Some(write.entitlement_status.clone());
        record.expires_at = write.expires_at;
        record.grace_until = write.grace_until;
        record.is_in_grace = Some(write.is_in_grace);
        record.entitlement_hash = Some(write.entitlement_hash.clone());
        record.last_entitlement_event_at = Some(write.last_entitlement_event_at);
        Ok(())
    }

    async fn seed_entitlement(&self, uid: &str) -> Result<()> {
        let mut entitlements = self.inner.entitlements.write().await;
        entitlements
            .entry(uid.to_string())
            .or_insert_with(StoredEntitlement::seed);
        Ok(())
    }

    async fn claim_event(
        &self,
        event_id: &str,
        uid: &str,
        received_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut processed = self.inner.processed_events.write().await;
        match processed.entry(event_id.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(ProcessedEvent {
                    uid: uid.to_string(),
                    received_at,
                });
                Ok(true)
            }
        }
    }

    async fn append_audit(&self, uid: &str, entry: &AuditEntry) -> Result<()> {
        let mut audits = self.inner.audits.write().await;
        let trail = audits.entry(uid.to_string()).or_default();
        // Same-key retries replace rather than duplicate.
        if let Some(existing) = trail.iter_mut().find(|e| e.event_id == entry.event_id) {
            *existing = entry.clone();
        } else {
            trail.push(entry.clone());
        }
        Ok(())
    }

    async fn list_audit_entries(&self, uid: &str) -> Result<Vec<AuditEntry>> {
        Ok(self
            .inner
            .audits
            .read()
            .await
            .get(uid)
            .cloned()
            .unwrap_or_default())
    }
}
