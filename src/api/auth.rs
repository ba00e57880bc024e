//! Authentication API endpoints
//!
//! Handles HTTP requests for accounts and tokens:
//! - POST /api/v1/auth/register/ - User registration
//! - POST /api/v1/token-auth/ - Exchange email + password for an API token

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::common::json_body;
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::UserResponse;
use crate::services::user::{LoginInput, RegisterInput};

/// Request body for user registration
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

/// Request body for obtaining a token; `username` carries the email
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

/// Response for a successful token request
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// POST /api/v1/auth/register/
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_body(body)?;
    let input = RegisterInput {
        email: body.email,
        password: body.password,
        first_name: body.first_name,
        last_name: body.last_name,
    };

    let user = state.user_service.register(input).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// POST /api/v1/token-auth/
pub async fn obtain_token(
    State(state): State<AppState>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let body = json_body(body)?;
    let email = body
        .username
        .or(body.email)
        .ok_or_else(|| ApiError::validation_error("username: This field is required."))?;

    let token = state
        .user_service
        .obtain_token(LoginInput::new(email, body.password))
        .await?;

    Ok(Json(TokenResponse { token: token.key }))
}
