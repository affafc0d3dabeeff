use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use serde_json::{Value, json};
use tower::ServiceExt;

use saucier::entitlements::Tier;
use saucier::provider::{ProviderClient, SubscriberSnapshot};
use saucier::reconcile::compute_signature;
use saucier::store::EntitlementStore;
use saucier::{AppContext, ConfigBuilder, MemoryEntitlementStore, Result};

const WEBHOOK_SECRET: &str = "whsec_test_secret";
const JWT_SECRET: &str = "jwt_test_secret";

struct StubProvider {
    snapshot: Option<SubscriberSnapshot>,
}

#[async_trait]
impl ProviderClient for StubProvider {
    async fn fetch_subscriber(&self, _uid: &str) -> Result<Option<SubscriberSnapshot>> {
        Ok(self.snapshot.clone())
    }
}

fn test_app(snapshot: Option<SubscriberSnapshot>) -> (Router, Arc<MemoryEntitlementStore>) {
    let config = ConfigBuilder::new()
        .with_webhook_secret(WEBHOOK_SECRET)
        .with_jwt_secret(JWT_SECRET)
        .with_grace_days(3)
        .build();
    let store = Arc::new(MemoryEntitlementStore::new());
    let ctx = AppContext::new(
        config,
        store.clone(),
        Some(Arc::new(StubProvider { snapshot })),
    );
    (saucier::http::router(ctx), store)
}

fn signed_webhook_request(body: &Value) -> Request<Body> {
    let bytes = serde_json::to_vec(body).unwrap();
    let signature = compute_signature(WEBHOOK_SECRET, &bytes);
    Request::builder()
        .method("POST")
        .uri("/webhooks/billing")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-saucier-signature", signature)
        .body(Body::from(bytes))
        .unwrap()
}

#[derive(Serialize)]
struct TestClaims {
    sub: String,
    admin: bool,
    exp: usize,
}

fn bearer_token(sub: &str, admin: bool) -> String {
    let claims = TestClaims {
        sub: sub.to_string(),
        admin,
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn webhook_rejects_wrong_content_type() {
    let (app, _) = test_app(None);
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/billing")
        .header(header::CONTENT_TYPE, "text/plain")
        .header("x-saucier-signature", "deadbeef")
        .body(Body::from("{}"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn webhook_rejects_missing_and_invalid_signatures() {
    let (app, _) = test_app(None);

    let unsigned = Request::builder()
        .method("POST")
        .uri("/webhooks/billing")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.clone().oneshot(unsigned).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = serde_json::to_vec(&json!({"event": {"type": "RENEWAL"}})).unwrap();
    let forged = Request::builder()
        .method("POST")
        .uri("/webhooks/billing")
        .header(header::CONTENT_TYPE, "application/json")
        .header(
            "x-saucier-signature",
            compute_signature("wrong_secret", &body),
        )
        .body(Body::from(body))
        .unwrap();
    let response = app.oneshot(forged).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["category"], "unauthenticated");
}

#[tokio::test]
async fn webhook_processes_initial_purchase() {
    let (app, store) = test_app(None);
    store.seed_entitlement("user-1").await.unwrap();

    let payload = json!({
        "event": {
            "id": "evt-purchase-1",
            "type": "INITIAL_PURCHASE",
            "app_user_id": "user-1",
            "product_id": "master_chef_yearly"
        }
    });
    let response = app.oneshot(signed_webhook_request(&payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["outcome"], "processed");

    let record = store.get_entitlement("user-1").await.unwrap().unwrap();
    assert_eq!(record.tier, Some(Tier::MasterChef));
    assert_eq!(record.entitlement_status.as_deref(), Some("active"));
}

#[tokio::test]
async fn webhook_acknowledges_duplicates_without_writes() {
    let (app, store) = test_app(None);

    let payload = json!({
        "event": {
            "id": "evt-dup-1",
            "type": "INITIAL_PURCHASE",
            "app_user_id": "user-1",
            "product_id": "home_chef_monthly"
        }
    });

    let first = app
        .clone()
        .oneshot(signed_webhook_request(&payload))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(response_json(first).await["outcome"], "processed");

    let record_before = store.get_entitlement("user-1").await.unwrap();

    let second = app.oneshot(signed_webhook_request(&payload)).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(response_json(second).await["outcome"], "duplicate");

    assert_eq!(store.get_entitlement("user-1").await.unwrap(), record_before);
    assert_eq!(store.processed_event_count().await, 1);
    assert_eq!(store.list_audit_entries("user-1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn webhook_acknowledges_benign_event_types_and_missing_uids() {
    let (app, store) = test_app(None);

    let benign = json!({
        "event": {
            "id": "evt-test-1",
            "type": "TEST",
            "app_user_id": "user-1"
        }
    });
    let response = app
        .clone()
        .oneshot(signed_webhook_request(&benign))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["outcome"], "ignored");

    let anonymous = json!({
        "event": {
            "id": "evt-anon-1",
            "type": "RENEWAL",
            "product_id": "home_chef_monthly"
        }
    });
    let response = app
        .clone()
        .oneshot(signed_webhook_request(&anonymous))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["outcome"], "missing_user");

    // Authenticated garbage is acknowledged too; retrying cannot help.
    let bytes = b"not json at all".to_vec();
    let garbage = Request::builder()
        .method("POST")
        .uri("/webhooks/billing")
        .header(header::CONTENT_TYPE, "application/json")
        .header(
            "x-saucier-signature",
            compute_signature(WEBHOOK_SECRET, &bytes),
        )
        .body(Body::from(bytes))
        .unwrap();
    let response = app.oneshot(garbage).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["outcome"], "ignored");

    assert!(store.get_entitlement("user-1").await.unwrap().is_none());
}

#[tokio::test]
async fn reconcile_requires_authentication() {
    let (app, _) = test_app(None);
    let request = Request::builder()
        .method("POST")
        .uri("/reconcile")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn reconcile_self_returns_projection() {
    let (app, _) = test_app(Some(SubscriberSnapshot {
        product_id: Some("home_chef_monthly".to_string()),
        expires_at: Some(Utc::now() + Duration::days(20)),
    }));

    let request = Request::builder()
        .method("POST")
        .uri("/reconcile")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", bearer_token("user-1", false)),
        )
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["uid"], "user-1");
    assert_eq!(body["tier"], "home_chef");
    assert_eq!(body["status"], "active");
    assert_eq!(body["is_in_grace"], false);
}

#[tokio::test]
async fn reconcile_cross_user_requires_admin() {
    let (app, _) = test_app(Some(SubscriberSnapshot::default()));

    let forbidden = Request::builder()
        .method("POST")
        .uri("/reconcile")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", bearer_token("user-1", false)),
        )
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"uid":"user-2"}"#))
        .unwrap();
    let response = app.clone().oneshot(forbidden).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response_json(response).await;
    assert_eq!(body["category"], "permission-denied");

    let allowed = Request::builder()
        .method("POST")
        .uri("/reconcile")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", bearer_token("admin-1", true)),
        )
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"uid":"user-2"}"#))
        .unwrap();
    let response = app.oneshot(allowed).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["uid"], "user-2");
    assert_eq!(body["tier"], "none");
    assert_eq!(body["status"], "inactive");
}

/// Scenario D over the wire: provider 404 projects to no entitlement.
#[tokio::test]
async fn reconcile_unknown_subscriber_projects_none() {
    let (app, store) = test_app(None);
    store.seed_entitlement("user-1").await.unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/reconcile")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", bearer_token("user-1", false)),
        )
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["tier"], "none");
    assert_eq!(body["status"], "inactive");
    assert_eq!(body["product_id"], Value::Null);
}
