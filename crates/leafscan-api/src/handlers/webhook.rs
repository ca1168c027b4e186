//! Stripe webhook handler.
//!
//! Fulfillment path for checkout: a verified `checkout.session.completed`
//! event turns the session metadata written at checkout time into a
//! subscription record with the purchased scan credits.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{info, warn};

use leafscan_models::{Subscription, SubscriptionStatus};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::services::stripe::CheckoutSessionObject;
use crate::state::AppState;

/// POST /api/webhooks/stripe
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("Missing Stripe signature"))?;

    state.stripe.verify_webhook_signature(signature, &body)?;

    let event = state.stripe.parse_event(&body)?;

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let session: CheckoutSessionObject = serde_json::from_value(event.data.object)
                .map_err(|e| ApiError::bad_request(format!("Invalid session object: {}", e)))?;
            fulfill_checkout(&state, session).await?;
        }
        other => {
            // Unhandled event types are acknowledged so Stripe stops retrying
            info!(event_type = %other, "Ignoring webhook event");
        }
    }

    Ok(Json(json!({ "received": true })))
}

async fn fulfill_checkout(state: &AppState, session: CheckoutSessionObject) -> ApiResult<()> {
    let Some(user_id) = session.metadata.get("user_id") else {
        warn!(session_id = %session.id, "Checkout session missing user_id metadata");
        return Ok(());
    };
    let plan_id = session
        .metadata
        .get("plan_id")
        .cloned()
        .unwrap_or_else(|| "premium".to_string());
    let scans_included: u32 = session
        .metadata
        .get("scans_included")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let validity_days: i64 = session
        .metadata
        .get("validity_days")
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    if scans_included == 0 {
        warn!(session_id = %session.id, "Checkout session grants no scans, skipping fulfillment");
        return Ok(());
    }

    let now = Utc::now();
    let subscription = Subscription {
        // Session ID as the subscription ID makes webhook retries idempotent
        id: session.id.clone(),
        user_id: user_id.clone(),
        status: SubscriptionStatus::Active,
        plan_type: plan_id.clone(),
        scans_remaining: scans_included,
        expires_at: now + Duration::days(validity_days),
        created_at: now,
        updated_at: now,
    };

    match state.store.create_subscription(&subscription).await {
        Ok(()) => {
            metrics::record_subscription_fulfilled(&plan_id);
            info!(
                user_id = %user_id,
                session_id = %session.id,
                scans = scans_included,
                "Fulfilled checkout"
            );
            Ok(())
        }
        Err(e) if e.is_already_exists() => {
            info!(session_id = %session.id, "Checkout already fulfilled, ignoring retry");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
