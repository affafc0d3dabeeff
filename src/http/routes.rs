//! HTTP handlers: webhook ingress, on-demand reconcile RPC, health probe.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::AppContext;
use crate::auth::Caller;
use crate::entitlements::Tier;
use crate::error::{Result, SaucierError};
use crate::reconcile::{SIGNATURE_HEADER, WebhookOutcome, parse_event, verify_signature};

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/billing", post(handle_webhook))
        .route("/reconcile", post(handle_reconcile))
        .with_state(ctx)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Acknowledgment body for authenticated webhook deliveries.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    pub outcome: &'static str,
}

impl WebhookAck {
    fn ok(outcome: WebhookOutcome) -> Json<Self> {
        Json(Self {
            status: "ok",
            outcome: outcome.as_str(),
        })
    }
}

/// Webhook ingress.
///
/// Rejects wrong content types (415) and bad signatures (401). Once a
/// payload is authenticated the response is always 200 — including for
/// ignored event types, unresolvable user ids, duplicates, and unparseable
/// bodies — so the provider does not retry deliveries that can never
/// succeed. Only internal failures return 500 (provider should retry).
async fn handle_webhook(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type
        .to_ascii_lowercase()
        .starts_with("application/json")
    {
        return Err(SaucierError::unsupported_media_type(
            "webhook payloads must be application/json",
        ));
    }

    let secret = ctx
        .config
        .webhook
        .secret
        .as_ref()
        .ok_or_else(|| SaucierError::failed_precondition("webhook secret is not configured"))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| SaucierError::unauthenticated("missing signature header"))?;
    verify_signature(secret, &body, signature)?;

    let event = match parse_event(&body) {
        Ok(event) => event,
        Err(_) => {
            // Authenticated but unusable; retrying will not help, so
            // acknowledge.
            return Ok(WebhookAck::ok(WebhookOutcome::Ignored));
        }
    };

    let outcome = ctx.reconciler.reconcile_event(&event, Utc::now()).await?;
    Ok(WebhookAck::ok(outcome))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileRequest {
    /// Target uid; defaults to the caller.
    pub uid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub uid: String,
    pub product_id: Option<String>,
    pub tier: Tier,
    /// External projection: `"active"` or `"inactive"`.
    pub status: &'static str,
    pub expires_at: Option<DateTime<Utc>>,
    pub grace_until: Option<DateTime<Utc>>,
    pub is_in_grace: bool,
}

/// On-demand pull reconciliation.
async fn handle_reconcile(
    State(ctx): State<AppContext>,
    caller: Caller,
    body: Option<Json<ReconcileRequest>>,
) -> Result<Json<ReconcileResponse>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let target = request.uid.unwrap_or_else(|| caller.uid.clone());
    caller.authorize_target(&target)?;

    let summary = ctx.reconciler.reconcile_user(&target, Utc::now()).await?;

    Ok(Json(ReconcileResponse {
        uid: summary.uid,
        product_id: summary.product_id,
        tier: summary.tier,
        status: summary.status.as_external(),
        expires_at: summary.expires_at,
        grace_until: summary.grace_until,
        is_in_grace: summary.is_in_grace,
    }))
}
