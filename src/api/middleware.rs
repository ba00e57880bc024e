//! API middleware
//!
//! Contains the interceptor chain applied to every API request:
//! - `identify_caller` resolves the token into a `Caller`, rejecting unknown tokens
//! - `response_cache` serves and stores GET responses per caller identity
//!
//! Also holds the shared `AppState` and the JSON `ApiError` type.

use axum::{
    body::Body,
    extract::{FromRequestParts, OriginalUri, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{response_key, Cache, CacheLayer};
use crate::config::Config;
use crate::db::repositories::{
    SqlxPostRepository, SqlxTagRepository, SqlxTokenRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{Caller, User};
use crate::services::{
    PostService, PostServiceError, TagService, TagServiceError, UserService, UserServiceError,
};

/// Header reporting whether a response came from the cache
pub const X_CACHE: &str = "x-cache";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub config: Arc<Config>,
    pub cache: Arc<Cache>,
    pub user_service: Arc<UserService>,
    pub tag_service: Arc<TagService>,
    pub post_service: Arc<PostService>,
}

impl AppState {
    /// Wire repositories and services on top of a pool and cache
    pub fn new(pool: DynDatabasePool, cache: Arc<Cache>, config: Arc<Config>) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let token_repo = SqlxTokenRepository::boxed(pool.clone());
        let tag_repo = SqlxTagRepository::boxed(pool.clone());
        let post_repo = SqlxPostRepository::boxed(pool.clone());

        let user_service = Arc::new(UserService::new(user_repo.clone(), token_repo));
        let tag_service = Arc::new(TagService::new(tag_repo, cache.clone()));
        let post_service = Arc::new(PostService::new(
            post_repo,
            user_repo,
            tag_service.clone(),
            cache.clone(),
        ));

        Self {
            pool,
            config,
            cache,
            user_service,
            tag_service,
            post_service,
        }
    }

    /// Base of absolute URLs: the configured public URL, else `http://{Host}`
    pub fn base_url(&self, headers: &HeaderMap) -> String {
        base_url(self.config.server.public_url.as_deref(), headers)
    }
}

fn base_url(public_url: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(url) = public_url {
        return url.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{}", host)
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and hide it from the client
    fn internal(err: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:#}", err);
        Self::internal_error("Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<PostServiceError> for ApiError {
    fn from(err: PostServiceError) -> Self {
        match err {
            PostServiceError::NotFound(msg) => ApiError::not_found(msg),
            PostServiceError::PermissionDenied(msg) => ApiError::forbidden(msg),
            PostServiceError::Unauthenticated => ApiError::unauthorized(err.to_string()),
            PostServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            PostServiceError::SlugExists(_) => ApiError::conflict(err.to_string()),
            PostServiceError::InvalidPage => ApiError::not_found(err.to_string()),
            PostServiceError::InvalidPeriod(e) => ApiError::not_found(e.to_string()),
            PostServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::NotFound(_) => ApiError::not_found("Not found."),
            TagServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            TagServiceError::AlreadyExists(_) => ApiError::conflict(err.to_string()),
            TagServiceError::InvalidPage => ApiError::not_found(err.to_string()),
            TagServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::validation_error(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Extract the API token from `Authorization` (`Token` or `Bearer`) or the
/// `session` cookie
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_str) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        for scheme in ["Token ", "Bearer "] {
            if let Some(token) = auth_str.strip_prefix(scheme) {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(cookie_str) = headers.get(header::COOKIE).and_then(|h| h.to_str().ok()) {
        for cookie in cookie_str.split(';') {
            if let Some(token) = cookie.trim().strip_prefix("session=") {
                return Some(token.to_string());
            }
        }
    }

    None
}

/// Resolve the caller and store it as a request extension
///
/// Requests without a token continue as anonymous; an unknown token is a 401.
pub async fn identify_caller(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let caller = match extract_token(request.headers()) {
        Some(token) => {
            let user = state
                .user_service
                .authenticate_token(&token)
                .await?
                .ok_or_else(|| ApiError::unauthorized("Invalid token."))?;
            Caller::User(user)
        }
        None => Caller::Anonymous,
    };

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Caller>().cloned().unwrap_or_default())
    }
}

/// The authenticated user, or 401
pub fn require_user(caller: &Caller) -> Result<&User, ApiError> {
    caller
        .user()
        .ok_or_else(|| ApiError::unauthorized("Authentication credentials were not provided."))
}

// ============================================================================
// Response cache
// ============================================================================

/// Cache settings for one group of routes
#[derive(Clone)]
pub struct CachePolicy {
    pub cache: Arc<Cache>,
    pub ttl: Duration,
    /// `server.public_url`; without it the Host header is part of the key
    pub public_url: Option<String>,
}

/// Stored form of a cached response
#[derive(Debug, Serialize, Deserialize)]
pub struct CachedResponse {
    pub content_type: Option<String>,
    pub body: String,
}

impl CachedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        if let Some(content_type) = self.content_type.and_then(|v| HeaderValue::from_str(&v).ok()) {
            response.headers_mut().insert(header::CONTENT_TYPE, content_type);
        }
        response
    }
}

fn mark(response: &mut Response, hit: bool) {
    let headers = response.headers_mut();
    headers.insert(
        header::VARY,
        HeaderValue::from_static("Authorization, Cookie"),
    );
    headers.insert(
        X_CACHE,
        HeaderValue::from_static(if hit { "HIT" } else { "MISS" }),
    );
}

/// Serve GET responses from the cache, storing fresh `200 OK` bodies
pub async fn response_cache(
    State(policy): State<CachePolicy>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET || !policy.cache.is_enabled() {
        return next.run(request).await;
    }

    let headers = request.headers();
    // Bodies embed absolute links, so the key holds the full absolute URI.
    let uri = format!(
        "{}{}",
        base_url(policy.public_url.as_deref(), headers),
        request
            .extensions()
            .get::<OriginalUri>()
            .map(|u| u.0.to_string())
            .unwrap_or_else(|| request.uri().to_string())
    );
    let key = response_key(
        request.method().as_str(),
        &uri,
        headers.get(header::AUTHORIZATION).and_then(|h| h.to_str().ok()),
        headers.get(header::COOKIE).and_then(|h| h.to_str().ok()),
    );

    match policy.cache.get::<CachedResponse>(&key).await {
        Ok(Some(cached)) => {
            tracing::debug!("Cache hit for {}", uri);
            let mut response = cached.into_response();
            mark(&mut response, true);
            return response;
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Failed to read cached response: {:#}", e),
    }

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("Failed to buffer response body: {}", e);
            return ApiError::internal_error("Internal server error").into_response();
        }
    };

    if let Ok(body) = std::str::from_utf8(&bytes) {
        let cached = CachedResponse {
            content_type: parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(String::from),
            body: body.to_string(),
        };
        if let Err(e) = policy.cache.set(&key, &cached, policy.ttl).await {
            tracing::warn!("Failed to store response for {}: {:#}", uri, e);
        }
    }

    parts.headers.remove(header::CONTENT_LENGTH);
    let mut response = Response::from_parts(parts, Body::from(bytes));
    mark(&mut response, false);
    response
}

// ============================================================================
// Tests
// ============================================================================
