//! Post API endpoints
//!
//! Handles HTTP requests for posts:
//! - GET /api/v1/posts/ - Visibility-filtered list
//! - GET /api/v1/posts/by-time/{period}/ - List restricted to a time window
//! - GET /api/v1/posts/mine/ - The caller's own posts
//! - POST /api/v1/posts/ - Create
//! - GET/PUT/PATCH/DELETE /api/v1/posts/{id}/ - Retrieve, update, destroy

use axum::{
    extract::{rejection::JsonRejection, OriginalUri, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::api::common::{double_option, json_body, parse_page, Paginated};
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::PostResponse;
use crate::models::{Caller, PostAction, PostFilter, PostOrdering, ResponseShape, TimeWindow};
use crate::services::{PostChanges, PostDraft, PostService};

/// Query parameters accepted by post listings
#[derive(Debug, Default, Deserialize)]
pub struct PostListQuery {
    pub page: Option<String>,
    /// `YYYY-MM-DD`, inclusive
    pub published_from: Option<String>,
    /// `YYYY-MM-DD`, inclusive of the whole day
    pub published_to: Option<String>,
    /// Author user ID
    pub author: Option<String>,
    /// Case-insensitive substring of the author's email
    pub author_email: Option<String>,
    /// Tag ID
    pub tags: Option<String>,
    /// Field name, optionally prefixed with `-`
    pub ordering: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        ApiError::validation_error(format!("{}: Enter a valid date in YYYY-MM-DD format.", field))
    })
}

fn parse_number(field: &str, value: &str) -> Result<i64, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::validation_error(format!("{}: Enter a whole number.", field)))
}

impl PostListQuery {
    /// Narrow a visibility filter with the query filters
    pub fn refine(&self, mut filter: PostFilter) -> Result<PostFilter, ApiError> {
        if let Some(from) = present(&self.published_from) {
            filter.published_from = Some(parse_date("published_from", from)?);
        }
        if let Some(to) = present(&self.published_to) {
            filter.published_to = Some(parse_date("published_to", to)?);
        }
        if let Some(author) = present(&self.author) {
            filter = filter.with_author(parse_number("author", author)?);
        }
        if let Some(email) = present(&self.author_email) {
            filter.author_email_contains = Some(email.to_string());
        }
        if let Some(tag) = present(&self.tags) {
            filter = filter.with_tag(parse_number("tags", tag)?);
        }
        if let Some(ordering) = present(&self.ordering) {
            let ordering = ordering
                .parse::<PostOrdering>()
                .map_err(|e| ApiError::validation_error(e.to_string()))?;
            filter = filter.with_ordering(Some(ordering));
        }
        Ok(filter)
    }
}

/// Body of `POST /posts/`
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    /// Author URL or email; defaults to the caller
    pub author: Option<String>,
    pub title: Option<String>,
    pub slug: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreatePostRequest {
    fn into_draft(self) -> Result<PostDraft, ApiError> {
        let title = self
            .title
            .ok_or_else(|| ApiError::validation_error("title: This field is required."))?;
        let slug = self
            .slug
            .ok_or_else(|| ApiError::validation_error("slug: This field is required."))?;

        Ok(PostDraft {
            author: self.author,
            title,
            slug,
            summary: self.summary,
            content: self.content,
            published_at: self.published_at,
            tags: self.tags,
        })
    }
}

/// Body of `PUT`/`PATCH /posts/{id}/`
#[derive(Debug, Default, Deserialize)]
pub struct UpdatePostRequest {
    pub author: Option<String>,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub published_at: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
}

impl From<UpdatePostRequest> for PostChanges {
    fn from(body: UpdatePostRequest) -> Self {
        Self {
            author: body.author,
            title: body.title,
            slug: body.slug,
            summary: body.summary,
            content: body.content,
            published_at: body.published_at,
            tags: body.tags,
        }
    }
}

/// Non-numeric IDs never match a post
pub fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse().map_err(|_| ApiError::not_found("Not found."))
}

async fn list_with(
    state: &AppState,
    caller: &Caller,
    window: Option<TimeWindow>,
    uri: &axum::http::Uri,
    headers: &HeaderMap,
    query: &PostListQuery,
) -> Result<Json<Paginated<PostResponse>>, ApiError> {
    let shape = ResponseShape::for_action(PostAction::List);
    let filter = query.refine(PostService::filter_for(caller).with_window(window))?;
    let params = parse_page(query.page.as_deref(), state.config.api.page_size)?;

    let page = state.post_service.list(&filter, &params).await?;

    let base = state.base_url(headers);
    let page = page.map(|post| PostResponse::render(post, shape, &base));
    Ok(Json(Paginated::from_page(page, &base, uri)))
}

/// GET /api/v1/posts/
pub async fn list_posts(
    State(state): State<AppState>,
    caller: Caller,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(query): Query<PostListQuery>,
) -> Result<Json<Paginated<PostResponse>>, ApiError> {
    list_with(&state, &caller, None, &uri, &headers, &query).await
}

/// GET /api/v1/posts/by-time/{period}/
pub async fn list_posts_by_time(
    State(state): State<AppState>,
    caller: Caller,
    Path(period): Path<String>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(query): Query<PostListQuery>,
) -> Result<Json<Paginated<PostResponse>>, ApiError> {
    let window = period
        .parse::<TimeWindow>()
        .map_err(crate::services::PostServiceError::from)?;
    list_with(&state, &caller, Some(window), &uri, &headers, &query).await
}

/// GET /api/v1/posts/mine/
pub async fn list_my_posts(
    State(state): State<AppState>,
    caller: Caller,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(query): Query<PostListQuery>,
) -> Result<Json<Paginated<PostResponse>>, ApiError> {
    let shape = ResponseShape::for_action(PostAction::Mine);
    let filter = query.refine(PostService::filter_for(&caller))?;
    let params = parse_page(query.page.as_deref(), state.config.api.page_size)?;

    let page = state
        .post_service
        .list_mine(&caller, filter, &params)
        .await?;

    let base = state.base_url(&headers);
    let page = page.map(|post| PostResponse::render(post, shape, &base));
    Ok(Json(Paginated::from_page(page, &base, &uri)))
}

/// POST /api/v1/posts/
pub async fn create_post(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    body: Result<Json<CreatePostRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let shape = ResponseShape::for_action(PostAction::Create);
    if !caller.is_authenticated() {
        return Err(crate::services::PostServiceError::Unauthenticated.into());
    }

    let draft = json_body(body)?.into_draft()?;
    let post = state.post_service.create(&caller, draft).await?;

    let base = state.base_url(&headers);
    Ok((
        StatusCode::CREATED,
        Json(PostResponse::render(post, shape, &base)),
    ))
}

/// GET /api/v1/posts/{id}/
pub async fn get_post(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PostResponse>, ApiError> {
    let shape = ResponseShape::for_action(PostAction::Retrieve);
    let post = state.post_service.get(&caller, parse_id(&id)?).await?;

    let base = state.base_url(&headers);
    Ok(Json(PostResponse::render(post, shape, &base)))
}

async fn update_with(
    state: &AppState,
    caller: &Caller,
    id: &str,
    headers: &HeaderMap,
    body: Result<Json<UpdatePostRequest>, JsonRejection>,
    action: PostAction,
) -> Result<Json<PostResponse>, ApiError> {
    let shape = ResponseShape::for_action(action);
    if !caller.is_authenticated() {
        return Err(crate::services::PostServiceError::Unauthenticated.into());
    }

    let id = parse_id(id)?;
    let changes = PostChanges::from(json_body(body)?);
    let partial = action == PostAction::PartialUpdate;
    let post = state
        .post_service
        .update(caller, id, changes, partial)
        .await?;

    let base = state.base_url(headers);
    Ok(Json(PostResponse::render(post, shape, &base)))
}

/// PUT /api/v1/posts/{id}/
pub async fn update_post(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<UpdatePostRequest>, JsonRejection>,
) -> Result<Json<PostResponse>, ApiError> {
    update_with(&state, &caller, &id, &headers, body, PostAction::Update).await
}

/// PATCH /api/v1/posts/{id}/
pub async fn patch_post(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<UpdatePostRequest>, JsonRejection>,
) -> Result<Json<PostResponse>, ApiError> {
    update_with(&state, &caller, &id, &headers, body, PostAction::PartialUpdate).await
}

/// DELETE /api/v1/posts/{id}/
pub async fn delete_post(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !caller.is_authenticated() {
        return Err(crate::services::PostServiceError::Unauthenticated.into());
    }

    state.post_service.delete(&caller, parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderField, Visibility};

    fn base_filter() -> PostFilter {
        PostFilter::new(Visibility::Published, Utc::now())
    }

    #[test]
    fn test_refine_applies_every_filter() {
        let query = PostListQuery {
            published_from: Some("2021-01-01".to_string()),
            published_to: Some("2021-01-31".to_string()),
            author: Some("3".to_string()),
            author_email: Some("Example".to_string()),
            tags: Some("9".to_string()),
            ordering: Some("-title".to_string()),
            ..PostListQuery::default()
        };

        let filter = query.refine(base_filter()).unwrap();
        assert_eq!(filter.published_from, NaiveDate::from_ymd_opt(2021, 1, 1));
        assert_eq!(filter.published_to, NaiveDate::from_ymd_opt(2021, 1, 31));
        assert_eq!(filter.author_id, Some(3));
        assert_eq!(filter.author_email_contains.as_deref(), Some("Example"));
        assert_eq!(filter.tag_id, Some(9));
        assert_eq!(
            filter.ordering,
            Some(PostOrdering {
                field: OrderField::Title,
                descending: true
            })
        );
    }

    #[test]
    fn test_refine_ignores_blank_and_rejects_garbage() {
        let blank = PostListQuery {
            author: Some(String::new()),
            ..PostListQuery::default()
        };
        assert_eq!(blank.refine(base_filter()).unwrap().author_id, None);

        for query in [
            PostListQuery {
                published_from: Some("01/02/2021".to_string()),
                ..PostListQuery::default()
            },
            PostListQuery {
                tags: Some("rust".to_string()),
                ..PostListQuery::default()
            },
            PostListQuery {
                ordering: Some("content".to_string()),
                ..PostListQuery::default()
            },
        ] {
            let err = query.refine(base_filter()).unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_create_request_requires_title_and_slug() {
        let body: CreatePostRequest = serde_json::from_str(r#"{"slug": "s"}"#).unwrap();
        assert!(body.into_draft().is_err());

        let body: CreatePostRequest =
            serde_json::from_str(r#"{"title": "T", "slug": "s", "tags": ["a"]}"#).unwrap();
        let draft = body.into_draft().unwrap();
        assert_eq!(draft.summary, "");
        assert_eq!(draft.tags, vec!["a"]);
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42").unwrap(), 42);
        assert_eq!(parse_id("abc").unwrap_err().status(), StatusCode::NOT_FOUND);
    }
}
