//! Usage summary handler.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use leafscan_models::{day_key, DAILY_FREE_SCAN_LIMIT};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

/// Subscription summary in the usage response.
#[derive(Serialize)]
pub struct SubscriptionSummary {
    pub plan_type: String,
    pub scans_remaining: u32,
    pub expires_at: String,
}

/// Usage summary response.
#[derive(Serialize)]
pub struct UsageResponse {
    pub date: String,
    pub scans_used_today: u32,
    pub daily_limit: u32,
    /// Present when a usable subscription would fund the next scan.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionSummary>,
}

/// GET /api/usage
pub async fn get_usage(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<UsageResponse>> {
    let now = Utc::now();
    let today = now.date_naive();

    let scans_used_today = state.store.scans_used_on(&user.uid, today).await?;
    let subscription = state
        .store
        .usable_subscription(&user.uid, now)
        .await?
        .map(|sub| SubscriptionSummary {
            plan_type: sub.plan_type,
            scans_remaining: sub.scans_remaining,
            expires_at: sub.expires_at.to_rfc3339(),
        });

    Ok(Json(UsageResponse {
        date: day_key(today),
        scans_used_today,
        daily_limit: DAILY_FREE_SCAN_LIMIT,
        subscription,
    }))
}
