//! Reconciliation orchestration.
//!
//! One code path serves both entry protocols: webhook push and on-demand
//! REST pull. Both converge on resolve → hash → write-or-skip, persist the
//! canonical user record with merge semantics, and append an audit entry.
//! Replaying the same provider state never produces more than one meaningful
//! write.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::webhook::{InboundEvent, WebhookOutcome, is_entitlement_event};
use crate::entitlements::{
    EntitlementStatus, ReconcileContext, Tier, hash_result, resolve, should_write,
};
use crate::error::{Result, SaucierError};
use crate::provider::ProviderClient;
use crate::store::{AuditEntry, EntitlementStore, EntitlementWrite, ReconcileSource};

/// Result of one reconciliation pass, projected for callers.
#[derive(Debug, Clone)]
pub struct ReconcileSummary {
    pub uid: String,
    pub product_id: Option<String>,
    pub tier: Tier,
    pub status: EntitlementStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub grace_until: Option<DateTime<Utc>>,
    pub is_in_grace: bool,
    /// Whether this pass changed the persisted record.
    pub wrote: bool,
}

/// Coordinates fetch, state derivation, change detection, and persistence.
pub struct Reconciler {
    store: Arc<dyn EntitlementStore>,
    /// Absent when no provider API key is configured; pull reconciliation
    /// then fails with a configuration error while webhooks keep working.
    provider: Option<Arc<dyn ProviderClient>>,
    grace_days: u32,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        provider: Option<Arc<dyn ProviderClient>>,
        grace_days: u32,
    ) -> Self {
        Self {
            store,
            provider,
            grace_days,
        }
    }

    /// Push protocol: apply a verified webhook event.
    ///
    /// Benign outcomes (ignored event type, unresolvable uid, duplicate
    /// delivery) are not errors; the caller acknowledges them with 200.
    pub async fn reconcile_event(
        &self,
        event: &InboundEvent,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome> {
        if !is_entitlement_event(&event.event_type) {
            tracing::debug!(
                target: "saucier::reconcile",
                event_id = %event.event_id,
                event_type = %event.event_type,
                "Ignoring non-entitlement event"
            );
            return Ok(WebhookOutcome::Ignored);
        }

        let Some(uid) = event.uid.as_deref() else {
            tracing::info!(
                target: "saucier::reconcile",
                event_id = %event.event_id,
                event_type = %event.event_type,
                "Acknowledging event with no resolvable user id"
            );
            return Ok(WebhookOutcome::MissingUser);
        };

        if !self.store.claim_event(&event.event_id, uid, now).await? {
            tracing::info!(
                target: "saucier::reconcile",
                event_id = %event.event_id,
                uid,
                "Duplicate delivery, acknowledging without side effects"
            );
            return Ok(WebhookOutcome::Duplicate);
        }

        let ctx = ReconcileContext {
            expires_at: event.expires_at,
            event_type: Some(event.event_type.clone()),
            grace_days: self.grace_days,
        };
        self.apply(
            uid,
            event.product_id.as_deref(),
            &ctx,
            ReconcileSource::Push,
            &event.event_id,
            now,
        )
        .await?;

        Ok(WebhookOutcome::Processed)
    }

    /// Pull protocol: fetch the subscriber from the provider and reconcile.
    ///
    /// A provider 404 means "no entitlement" and reconciles the user down to
    /// [`Tier::None`].
    pub async fn reconcile_user(&self, uid: &str, now: DateTime<Utc>) -> Result<ReconcileSummary> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            SaucierError::failed_precondition("provider API key is not configured")
        })?;

        let snapshot = provider.fetch_subscriber(uid).await?.unwrap_or_default();

        let ctx = ReconcileContext {
            expires_at: snapshot.expires_at,
            event_type: None,
            grace_days: self.grace_days,
        };
        // Pull passes have no provider event id; each poll gets its own
        // audit key while the record write stays hash-guarded. The random
        // suffix keeps polls landing in the same millisecond distinct.
        let event_id = format!(
            "pull:{}:{}-{:08x}",
            uid,
            now.timestamp_millis(),
            fastrand::u32(..)
        );
        self.apply(
            uid,
            snapshot.product_id.as_deref(),
            &ctx,
            ReconcileSource::Pull,
            &event_id,
            now,
        )
        .await
    }

    /// Shared core: derive state, detect change, persist, audit.
    async fn apply(
        &self,
        uid: &str,
        product_id: Option<&str>,
        ctx: &ReconcileContext,
        source: ReconcileSource,
        event_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ReconcileSummary> {
        let result = resolve(product_id, ctx, now);
        let new_hash = hash_result(&result);

        let existing = self.store.get_entitlement(uid).await?;
        let prev_hash = existing
            .as_ref()
            .and_then(|record| record.entitlement_hash.clone());
        let record_exists = existing.is_some();
        let record_has_core_fields = existing
            .as_ref()
            .is_some_and(|record| record.has_core_fields());

        let wrote = should_write(
            prev_hash.as_deref(),
            &new_hash,
            record_exists,
            record_has_core_fields,
        );

        let is_in_grace = result.is_in_grace(now);
        let status = result.entitlement_status.as_external().to_string();

        if wrote {
            let write = EntitlementWrite {
                product_id: result
                    .product_id
                    .clone()
                    .unwrap_or_else(|| "none".to_string()),
                tier: result.tier,
                entitlement_status: status.clone(),
                expires_at: result.expires_at,
                grace_until: result.grace_until,
                is_in_grace,
                entitlement_hash: new_hash.clone(),
                last_entitlement_event_at: now,
            };
            self.store.merge_entitlement(uid, &write).await?;
        }

        let audit = AuditEntry {
            event_id: event_id.to_string(),
            uid: uid.to_string(),
            source,
            event_type: result.event_type.clone(),
            product_id: result.product_id.clone(),
            tier: result.tier,
            entitlement_status: status,
            expires_at: result.expires_at,
            grace_until: result.grace_until,
            prev_hash,
            new_hash: new_hash.clone(),
            wrote,
            recorded_at: now,
        };
        self.store.append_audit(uid, &audit).await?;

        tracing::info!(
            target: "saucier::reconcile",
            uid,
            event_id,
            source = source.as_str(),
            tier = %result.tier,
            status = %result.entitlement_status,
            wrote,
            "Reconciliation pass complete"
        );

        Ok(ReconcileSummary {
            uid: uid.to_string(),
            product_id: result.product_id,
            tier: result.tier,
            status: result.entitlement_status,
            expires_at: result.expires_at,
            grace_until: result.grace_until,
            is_in_grace,
            wrote,
        })
    }
}
