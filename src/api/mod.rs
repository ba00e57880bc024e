//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api/v1`:
//! - Post endpoints (list, time windows, own posts, CRUD)
//! - Tag endpoints (CRUD and posts by tag)
//! - User detail
//! - Registration and token authentication
//!
//! Every request first passes `identify_caller`; cacheable GET routes are
//! wrapped in `response_cache` with a TTL per route group.

pub mod auth;
pub mod common;
pub mod middleware;
pub mod posts;
pub mod responses;
pub mod tags;
pub mod users;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, CachePolicy};

fn cached(state: &AppState, ttl_seconds: u64) -> CachePolicy {
    CachePolicy {
        cache: state.cache.clone(),
        ttl: Duration::from_secs(ttl_seconds),
        public_url: state.config.server.public_url.clone(),
    }
}

/// Build the `/api/v1` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let cache_config = &state.config.cache;
    let list_policy = cached(&state, cache_config.post_list_ttl_seconds);
    let default_policy = cached(&state, cache_config.ttl_seconds);

    // Post lists (120 s by default)
    let post_lists = Router::new()
        .route("/posts/", get(posts::list_posts).post(posts::create_post))
        .route("/posts/by-time/{period}/", get(posts::list_posts_by_time))
        .route_layer(axum_middleware::from_fn_with_state(
            list_policy,
            middleware::response_cache,
        ));

    // Other cached reads (300 s by default)
    let cached_reads = Router::new()
        .route("/posts/mine/", get(posts::list_my_posts))
        .route("/tags/", get(tags::list_tags).post(tags::create_tag))
        .route(
            "/tags/{id}/",
            get(tags::get_tag)
                .put(tags::update_tag)
                .patch(tags::update_tag)
                .delete(tags::delete_tag),
        )
        .route("/tags/{id}/posts/", get(tags::list_tag_posts))
        .route("/users/{email}", get(users::get_user))
        .route_layer(axum_middleware::from_fn_with_state(
            default_policy,
            middleware::response_cache,
        ));

    // Never cached
    let uncached = Router::new()
        .route(
            "/posts/{id}/",
            get(posts::get_post)
                .put(posts::update_post)
                .patch(posts::patch_post)
                .delete(posts::delete_post),
        )
        .route("/auth/register/", post(auth::register))
        .route("/token-auth/", post(auth::obtain_token));

    Router::new()
        .merge(post_lists)
        .merge(cached_reads)
        .merge(uncached)
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::identify_caller,
        ))
}

/// Build the complete router with middleware
///
/// # Errors
/// Returns an error if the configured CORS origin is not a valid header value.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let origin = state
        .config
        .server
        .cors_origin
        .parse::<HeaderValue>()
        .with_context(|| {
            format!(
                "Invalid CORS origin '{}'",
                state.config.server.cors_origin
            )
        })?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    Ok(Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
