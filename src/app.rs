//! Application wiring.
//!
//! Clients and stores are constructed once at startup and injected; nothing
//! in the service relies on module-level singletons.

use std::sync::Arc;

use crate::config::Config;
use crate::provider::ProviderClient;
use crate::reconcile::Reconciler;
use crate::store::EntitlementStore;

/// Shared per-process state handed to every handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn EntitlementStore>,
    pub reconciler: Arc<Reconciler>,
}

impl AppContext {
    /// Wire up the context from configuration and injected collaborators.
    ///
    /// `provider` may be absent when no API key is configured; webhook
    /// processing still works, pull reconciliation reports a configuration
    /// failure.
    #[must_use]
    pub fn new(
        config: Config,
        store: Arc<dyn EntitlementStore>,
        provider: Option<Arc<dyn ProviderClient>>,
    ) -> Self {
        let grace_days = config.entitlements.grace_days;
        let reconciler = Arc::new(Reconciler::new(store.clone(), provider, grace_days));
        Self {
            config: Arc::new(config),
            store,
            reconciler,
        }
    }
}
