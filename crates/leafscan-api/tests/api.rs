//! API integration tests.
//!
//! Routes are exercised against the in-memory entitlement store, so no
//! Firestore project or live Stripe account is needed.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use sha2::Sha256;
use tower::ServiceExt;

use leafscan_api::config::StripeConfig;
use leafscan_api::services::detection::MockDetector;
use leafscan_api::services::testing::InMemoryStore;
use leafscan_api::services::{DiseaseDetector, EntitlementStore};
use leafscan_api::{create_router, ApiConfig, AppState};

const WEBHOOK_SECRET: &str = "whsec_test_secret";

fn test_state(store: Arc<InMemoryStore>) -> AppState {
    let mut config = ApiConfig::default();
    config.stripe = StripeConfig {
        secret_key: "sk_test_key".to_string(),
        webhook_secret: WEBHOOK_SECRET.to_string(),
    };
    AppState::with_store(
        config,
        store as Arc<dyn EntitlementStore>,
        Arc::new(MockDetector::with_delay(std::time::Duration::ZERO)) as Arc<dyn DiseaseDetector>,
    )
}

fn test_router(store: Arc<InMemoryStore>) -> axum::Router {
    create_router(test_state(store), None)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn stripe_signature(payload: &[u8]) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let digest = mac.finalize().into_bytes();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("t={},v1={}", timestamp, hex)
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_router(Arc::new(InMemoryStore::new()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_ready_endpoint() {
    let app = test_router(Arc::new(InMemoryStore::new()));

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_scan_requires_authentication() {
    let app = test_router(Arc::new(InMemoryStore::new()));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/scan")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"image": "aGVsbG8="}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_scan_rejects_garbage_token() {
    let app = test_router(Arc::new(InMemoryStore::new()));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/scan")
                .header("Authorization", "Bearer not-a-token")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"image": "aGVsbG8="}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_security_headers_present() {
    let app = test_router(Arc::new(InMemoryStore::new()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
    assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
    assert!(headers.contains_key("X-Request-ID"));
}

#[tokio::test]
async fn test_webhook_fulfills_checkout() {
    let store = Arc::new(InMemoryStore::new());
    let app = test_router(Arc::clone(&store));

    let payload = serde_json::json!({
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_abc",
                "metadata": {
                    "user_id": "u1",
                    "plan_id": "premium",
                    "scans_included": "50",
                    "validity_days": "30"
                }
            }
        }
    })
    .to_string();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webhooks/stripe")
                .header("stripe-signature", stripe_signature(payload.as_bytes()))
                .header("Content-Type", "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.subscription_balance("cs_test_abc").await, Some(50));
}

#[tokio::test]
async fn test_webhook_retry_is_idempotent() {
    let store = Arc::new(InMemoryStore::new());

    let payload = serde_json::json!({
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_retry",
                "metadata": {
                    "user_id": "u1",
                    "plan_id": "premium",
                    "scans_included": "50",
                    "validity_days": "30"
                }
            }
        }
    })
    .to_string();

    for _ in 0..2 {
        let app = test_router(Arc::clone(&store));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/webhooks/stripe")
                    .header("stripe-signature", stripe_signature(payload.as_bytes()))
                    .header("Content-Type", "application/json")
                    .body(Body::from(payload.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(store.subscription_balance("cs_test_retry").await, Some(50));
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature() {
    let store = Arc::new(InMemoryStore::new());
    let app = test_router(Arc::clone(&store));

    let payload = r#"{"type":"checkout.session.completed","data":{"object":{"id":"cs_x"}}}"#;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webhooks/stripe")
                .header("stripe-signature", "t=0,v1=deadbeef")
                .header("Content-Type", "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.subscription_balance("cs_x").await, None);
}

#[tokio::test]
async fn test_unknown_webhook_event_is_acknowledged() {
    let app = test_router(Arc::new(InMemoryStore::new()));

    let payload = r#"{"type":"invoice.created","data":{"object":{}}}"#;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/webhooks/stripe")
                .header("stripe-signature", stripe_signature(payload.as_bytes()))
                .header("Content-Type", "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["received"], true);
}
