//! HTTP surface for the service.

pub mod routes;

pub use routes::{ReconcileRequest, ReconcileResponse, WebhookAck, router};
