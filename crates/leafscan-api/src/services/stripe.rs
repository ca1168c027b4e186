//! Stripe integration.
//!
//! Talks to the Stripe REST API directly with form-encoded requests and
//! verifies webhook signatures per Stripe's scheme (HMAC-SHA256 over
//! `"{timestamp}.{payload}"`, signatures carried in the `Stripe-Signature`
//! header).

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use tracing::info;

use leafscan_models::ScanPlan;

use crate::config::StripeConfig;
use crate::error::{ApiError, ApiResult};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Reject webhook timestamps older than this, against replay.
const WEBHOOK_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// A created checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Webhook event envelope.
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// Checkout session object as it appears in `checkout.session.completed`.
#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Stripe API client.
#[derive(Clone)]
pub struct StripeService {
    http: Client,
    config: StripeConfig,
    app_base_url: String,
}

impl StripeService {
    pub fn new(config: StripeConfig, app_base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to build Stripe HTTP client");
        Self {
            http,
            config,
            app_base_url: app_base_url.into(),
        }
    }

    /// Create a checkout session for a plan purchase.
    ///
    /// The user identity and plan parameters ride along as opaque session
    /// metadata; fulfillment reads them back from the webhook.
    pub async fn create_checkout_session(
        &self,
        user_id: &str,
        plan: &ScanPlan,
    ) -> ApiResult<CheckoutSession> {
        if self.config.secret_key.is_empty() {
            return Err(ApiError::payment("STRIPE_SECRET_KEY is not configured"));
        }

        let success_url = format!("{}/dashboard?checkout=success", self.app_base_url);
        let cancel_url = format!("{}/pricing?checkout=cancelled", self.app_base_url);
        let unit_amount = plan.price_cents.to_string();
        let scans_included = plan.scans_included.to_string();
        let validity_days = plan.validity_days.to_string();

        let form: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("success_url", &success_url),
            ("cancel_url", &cancel_url),
            ("line_items[0][price_data][currency]", "usd"),
            ("line_items[0][price_data][product_data][name]", plan.name),
            ("line_items[0][price_data][unit_amount]", &unit_amount),
            ("line_items[0][quantity]", "1"),
            ("metadata[user_id]", user_id),
            ("metadata[plan_id]", plan.id),
            ("metadata[scans_included]", &scans_included),
            ("metadata[validity_days]", &validity_days),
        ];

        let response = self
            .http
            .post(format!("{}/checkout/sessions", STRIPE_API_BASE))
            .basic_auth(&self.config.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| ApiError::payment(format!("Checkout session request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::payment(format!(
                "Stripe returned {}: {}",
                status, body
            )));
        }

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| ApiError::payment(format!("Invalid checkout session response: {}", e)))?;

        info!(user_id = %user_id, plan = %plan.id, session_id = %session.id, "Created checkout session");
        Ok(session)
    }

    /// Verify a `Stripe-Signature` header against the raw payload.
    pub fn verify_webhook_signature(&self, header: &str, payload: &[u8]) -> Result<(), ApiError> {
        self.verify_webhook_signature_at(header, payload, Utc::now().timestamp())
    }

    fn verify_webhook_signature_at(
        &self,
        header: &str,
        payload: &[u8],
        now_ts: i64,
    ) -> Result<(), ApiError> {
        if self.config.webhook_secret.is_empty() {
            return Err(ApiError::payment("STRIPE_WEBHOOK_SECRET is not configured"));
        }

        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<&str> = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| ApiError::bad_request("Malformed Stripe-Signature header"))?;
        if signatures.is_empty() {
            return Err(ApiError::bad_request("Malformed Stripe-Signature header"));
        }

        if (now_ts - timestamp).abs() > WEBHOOK_TOLERANCE_SECS {
            return Err(ApiError::bad_request("Webhook timestamp outside tolerance"));
        }

        let mut mac = HmacSha256::new_from_slice(self.config.webhook_secret.as_bytes())
            .map_err(|_| ApiError::internal("Invalid webhook secret"))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = mac.finalize().into_bytes();
        let expected_hex = hex_encode(&expected);

        if signatures.iter().any(|s| constant_time_eq(s, &expected_hex)) {
            Ok(())
        } else {
            Err(ApiError::bad_request("Webhook signature mismatch"))
        }
    }

    /// Parse a verified webhook payload into an event envelope.
    pub fn parse_event(&self, payload: &[u8]) -> Result<StripeEvent, ApiError> {
        serde_json::from_slice(payload)
            .map_err(|e| ApiError::bad_request(format!("Invalid webhook payload: {}", e)))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> StripeService {
        StripeService::new(
            StripeConfig {
                secret_key: "sk_test_123".to_string(),
                webhook_secret: secret.to_string(),
            },
            "http://localhost:3000",
        )
    }

    fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex_encode(&mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let svc = service("whsec_test");
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let now = 1_700_000_000;
        let header = sign("whsec_test", now, payload);
        assert!(svc.verify_webhook_signature_at(&header, payload, now).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let svc = service("whsec_test");
        let now = 1_700_000_000;
        let header = sign("whsec_test", now, b"original");
        assert!(svc
            .verify_webhook_signature_at(&header, b"tampered", now)
            .is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let svc = service("whsec_test");
        let payload = b"payload";
        let old = 1_700_000_000;
        let header = sign("whsec_test", old, payload);
        assert!(svc
            .verify_webhook_signature_at(&header, payload, old + WEBHOOK_TOLERANCE_SECS + 1)
            .is_err());
    }

    #[test]
    fn test_missing_parts_rejected() {
        let svc = service("whsec_test");
        assert!(svc
            .verify_webhook_signature_at("v1=deadbeef", b"x", 0)
            .is_err());
        assert!(svc.verify_webhook_signature_at("t=123", b"x", 123).is_err());
    }

    #[test]
    fn test_parse_checkout_event() {
        let svc = service("whsec_test");
        let payload = br#"{
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_123", "metadata": {"user_id": "u1", "plan_id": "premium"}}}
        }"#;
        let event = svc.parse_event(payload).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
        let session: CheckoutSessionObject = serde_json::from_value(event.data.object).unwrap();
        assert_eq!(session.id, "cs_123");
        assert_eq!(session.metadata.get("user_id").unwrap(), "u1");
    }
}
