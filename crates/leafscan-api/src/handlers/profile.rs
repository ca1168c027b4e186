//! Profile endpoint handlers.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use leafscan_models::{validate_name, Profile};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Profile response.
#[derive(Serialize)]
pub struct ProfileResponse {
    pub uid: String,
    pub email: Option<String>,
    pub full_name: String,
    pub is_admin: bool,
    pub created_at: String,
}

impl From<Profile> for ProfileResponse {
    fn from(profile: Profile) -> Self {
        Self {
            uid: profile.uid,
            email: profile.email,
            full_name: profile.full_name,
            is_admin: profile.is_admin,
            created_at: profile.created_at.to_rfc3339(),
        }
    }
}

/// GET /api/profile
///
/// Creates the profile from auth claims on first call.
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<ProfileResponse>> {
    let profile = state
        .store
        .get_or_create_profile(&user.uid, user.email.as_deref(), user.name.as_deref())
        .await?;
    Ok(Json(profile.into()))
}

/// Profile update payload.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: String,
}

/// PATCH /api/profile
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    let validation = validate_name(&payload.full_name);
    if !validation.valid {
        return Err(ApiError::Validation(
            validation.error.unwrap_or_else(|| "Invalid name".to_string()),
        ));
    }

    // Bootstrap first so a PATCH before any scan still has a row to update
    let mut profile = state
        .store
        .get_or_create_profile(&user.uid, user.email.as_deref(), user.name.as_deref())
        .await?;

    let trimmed = payload.full_name.trim();
    state.store.update_profile_name(&user.uid, trimmed).await?;
    profile.full_name = trimmed.to_string();

    Ok(Json(profile.into()))
}
