//! Entitlement reconciliation: webhook protocol handling and the
//! orchestrator both entry protocols converge on.

pub mod orchestrator;
pub mod webhook;

pub use orchestrator::{ReconcileSummary, Reconciler};
pub use webhook::{
    InboundEvent, SIGNATURE_HEADER, WebhookOutcome, compute_signature, is_entitlement_event,
    parse_event, verify_signature,
};
