//! Scan endpoint handlers.

use axum::extract::{Query, State};
use axum::Json;
use base64::Engine;
use serde::{Deserialize, Serialize};

use leafscan_models::ScanRecord;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Maximum scans returned by the history endpoint.
const MAX_HISTORY_LIMIT: i32 = 100;

/// Scan request payload. The image arrives base64-encoded.
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    /// Base64-encoded image bytes.
    pub image: String,
    /// Original filename, if the client has one.
    pub image_name: Option<String>,
}

/// Scan result returned to the caller.
#[derive(Serialize)]
pub struct ScanResponse {
    pub id: String,
    pub disease_name: String,
    pub confidence: f64,
    pub remedies: Vec<String>,
    pub status: String,
    pub created_at: String,
}

impl From<ScanRecord> for ScanResponse {
    fn from(record: ScanRecord) -> Self {
        Self {
            id: record.id,
            disease_name: record.disease_name,
            confidence: record.confidence,
            remedies: record.remedies,
            status: record.status.as_str().to_string(),
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

/// POST /api/scan
///
/// Runs the full scan flow: profile bootstrap, entitlement check, detection,
/// persistence, debit.
pub async fn create_scan(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ScanRequest>,
) -> ApiResult<Json<ScanResponse>> {
    if payload.image.is_empty() {
        return Err(ApiError::bad_request("Image payload is required"));
    }

    let image = base64::engine::general_purpose::STANDARD
        .decode(payload.image.as_bytes())
        .map_err(|_| ApiError::bad_request("Image payload is not valid base64"))?;

    let record = state
        .scans
        .run_scan(
            &user.uid,
            user.email.as_deref(),
            user.name.as_deref(),
            &image,
            payload.image_name.as_deref(),
        )
        .await?;

    Ok(Json(record.into()))
}

/// Query parameters for scan history.
#[derive(Debug, Deserialize)]
pub struct ScanHistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: i32,
}

fn default_limit() -> i32 {
    20
}

/// Scan history response.
#[derive(Serialize)]
pub struct ScanHistoryResponse {
    pub scans: Vec<ScanResponse>,
}

/// GET /api/scans
pub async fn list_scans(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ScanHistoryQuery>,
) -> ApiResult<Json<ScanHistoryResponse>> {
    let limit = query.limit.clamp(1, MAX_HISTORY_LIMIT);
    let records = state.store.recent_scans(&user.uid, limit).await?;

    Ok(Json(ScanHistoryResponse {
        scans: records.into_iter().map(ScanResponse::from).collect(),
    }))
}
