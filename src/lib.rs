//! Saucier backend - entitlement sync for the Saucier recipe app.
//!
//! Mirrors subscription state owned by the external billing provider into
//! per-user entitlement records. Two entry protocols, one reconciliation
//! core:
//!
//! - **Push**: signed provider webhooks (`POST /webhooks/billing`)
//! - **Pull**: authenticated on-demand polls (`POST /reconcile`)
//!
//! Both converge on a pure state derivation (product → tier, expiry → grace
//! window), hash-based change detection, merge-upsert persistence, and an
//! append-only audit trail. Duplicate webhook deliveries are absorbed by an
//! exclusive-create dedupe gate.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use saucier::{AppContext, Config, MemoryEntitlementStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     saucier::init_tracing();
//!     let config = Config::from_env();
//!     let store = Arc::new(MemoryEntitlementStore::new());
//!     let ctx = AppContext::new(config, store, None);
//!     let app = saucier::http::router(ctx);
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

pub mod app;
pub mod auth;
pub mod config;
pub mod entitlements;
pub mod error;
pub mod http;
pub mod provider;
pub mod reconcile;
pub mod store;

pub use app::AppContext;
pub use config::{Config, ConfigBuilder};
pub use entitlements::{EntitlementStatus, ReconcileContext, ReconcileResult, Tier};
pub use error::{Result, SaucierError};
pub use provider::{ProviderClient, RestProviderClient, RetryPolicy};
pub use reconcile::{ReconcileSummary, Reconciler, WebhookOutcome};
pub use store::{EntitlementStore, MemoryEntitlementStore, StoredEntitlement};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize tracing from the environment.
///
/// Respects `RUST_LOG`; set `SAUCIER_LOG_JSON=true` for JSON output.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("SAUCIER_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
