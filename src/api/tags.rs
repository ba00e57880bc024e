//! Tag API endpoints
//!
//! Handles HTTP requests for tag management:
//! - GET /api/v1/tags/ - Paginated tag list
//! - POST /api/v1/tags/ - Create a tag
//! - GET/PUT/PATCH/DELETE /api/v1/tags/{id}/ - Retrieve, rename, delete
//! - GET /api/v1/tags/{id}/posts/ - Posts carrying the tag

use axum::{
    extract::{rejection::JsonRejection, OriginalUri, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::api::common::{json_body, parse_page, PageQuery, Paginated};
use crate::api::middleware::{require_user, ApiError, AppState};
use crate::api::posts::parse_id;
use crate::api::responses::{PostResponse, TagResponse};
use crate::models::{Caller, PostAction, ResponseShape};

/// Body of tag create and update requests
#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub name: Option<String>,
}

impl TagRequest {
    fn name(self) -> Result<String, ApiError> {
        self.name
            .ok_or_else(|| ApiError::validation_error("name: This field is required."))
    }
}

/// GET /api/v1/tags/
pub async fn list_tags(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paginated<TagResponse>>, ApiError> {
    let params = parse_page(query.page.as_deref(), state.config.api.page_size)?;
    let page = state.tag_service.list(&params).await?;

    let base = state.base_url(&headers);
    Ok(Json(Paginated::from_page(
        page.map(TagResponse::from),
        &base,
        &uri,
    )))
}

/// GET /api/v1/tags/{id}/
pub async fn get_tag(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TagResponse>, ApiError> {
    let tag = state.tag_service.get_by_id(parse_id(&id)?).await?;
    Ok(Json(tag.into()))
}

/// POST /api/v1/tags/
pub async fn create_tag(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<TagRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let user = require_user(&caller)?;
    let name = json_body(body)?.name()?;

    let tag = state.tag_service.create(&name).await?;
    tracing::info!(tag_id = tag.id, user_id = user.id, "Created tag '{}'", tag.name);

    Ok((StatusCode::CREATED, Json(TagResponse::from(tag))))
}

/// PUT/PATCH /api/v1/tags/{id}/
pub async fn update_tag(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<TagRequest>, JsonRejection>,
) -> Result<Json<TagResponse>, ApiError> {
    require_user(&caller)?;
    let id = parse_id(&id)?;
    let name = json_body(body)?.name()?;

    let tag = state.tag_service.update(id, &name).await?;
    Ok(Json(tag.into()))
}

/// DELETE /api/v1/tags/{id}/
pub async fn delete_tag(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_user(&caller)?;
    state.tag_service.delete(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/tags/{id}/posts/
pub async fn list_tag_posts(
    State(state): State<AppState>,
    Path(id): Path<String>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<Paginated<PostResponse>>, ApiError> {
    let shape = ResponseShape::for_action(PostAction::TagPosts);
    let id = parse_id(&id)?;
    let params = parse_page(query.page.as_deref(), state.config.api.page_size)?;

    let page = state.post_service.list_by_tag(id, &params).await?;

    let base = state.base_url(&headers);
    let page = page.map(|post| PostResponse::render(post, shape, &base));
    Ok(Json(Paginated::from_page(page, &base, &uri)))
}
