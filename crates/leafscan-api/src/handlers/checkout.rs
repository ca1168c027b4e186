//! Checkout endpoint handler.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use leafscan_models::ScanPlan;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Checkout request payload.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_id: String,
}

/// Checkout session response.
#[derive(Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub checkout_url: String,
}

/// POST /api/checkout
///
/// Validates the plan against the fixed catalog and creates a payment
/// checkout session carrying the user identity as metadata for fulfillment.
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let plan = ScanPlan::find(&payload.plan_id)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown plan: {}", payload.plan_id)))?;

    let session = state.stripe.create_checkout_session(&user.uid, plan).await?;
    metrics::record_checkout_session(plan.id);

    Ok(Json(CheckoutResponse {
        session_id: session.id,
        checkout_url: session.url,
    }))
}
