//! User API endpoints
//!
//! - GET /api/v1/users/{email} - Public user detail, looked up by email

use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::UserResponse;

/// GET /api/v1/users/{email}
pub async fn get_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .user_service
        .get_by_email(&email)
        .await?
        .ok_or_else(|| ApiError::not_found("Not found."))?;

    Ok(Json(user.into()))
}
