//! Post service
//!
//! Implements business logic for blog posts:
//! - Visibility-filtered listing, windowed listing, own posts and posts by tag
//! - Create, read, update, delete with author/staff authorization
//! - Validation of titles, slugs and author references
//! - Cache invalidation after every write

use crate::cache::{invalidate_content, Cache};
use crate::db::repositories::{is_unique_violation, PostRepository, UserRepository};
use crate::models::{
    Caller, CreatePostInput, ListParams, PagedResult, Post, PostFilter, UpdatePostInput, User,
    Visibility,
};
use crate::services::tag::{TagService, TagServiceError};
use anyhow::Context;
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;

const MAX_TITLE_LEN: usize = 255;
const MAX_SLUG_LEN: usize = 255;
const MAX_SUMMARY_LEN: usize = 500;

const NOT_FOUND: &str = "Not found.";
const NOT_ALLOWED: &str = "You do not have permission to perform this action.";
const MINE_REQUIRES_LOGIN: &str = "You must be logged in to see which Posts are yours";

/// Error types for post service operations
#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    /// Post (or tag) not found, or not visible to the caller
    #[error("{0}")]
    NotFound(String),

    /// Caller is authenticated but not allowed to do this
    #[error("{0}")]
    PermissionDenied(String),

    /// Caller must authenticate first
    #[error("Authentication credentials were not provided.")]
    Unauthenticated,

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Another post already uses the slug
    #[error("Post with slug '{0}' already exists")]
    SlugExists(String),

    /// Page number outside the result set
    #[error("Invalid page.")]
    InvalidPage,

    /// Unknown time period name
    #[error(transparent)]
    InvalidPeriod(#[from] crate::models::InvalidTimeWindow),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<TagServiceError> for PostServiceError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::NotFound(id) => {
                PostServiceError::NotFound(format!("Tag {} not found", id))
            }
            TagServiceError::ValidationError(msg) => PostServiceError::ValidationError(msg),
            TagServiceError::AlreadyExists(name) => {
                PostServiceError::ValidationError(format!("Tag '{}' already exists", name))
            }
            TagServiceError::InvalidPage => PostServiceError::InvalidPage,
            TagServiceError::InternalError(e) => PostServiceError::InternalError(e),
        }
    }
}

/// Fields submitted to create a post
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    /// Author URL (`.../users/{email}`) or bare email; defaults to the caller
    pub author: Option<String>,
    pub title: String,
    pub slug: String,
    pub summary: String,
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Tag names, created when unknown
    pub tags: Vec<String>,
}

/// Fields submitted to update a post; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub author: Option<String>,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
}

/// Post service
pub struct PostService {
    post_repo: Arc<dyn PostRepository>,
    user_repo: Arc<dyn UserRepository>,
    tags: Arc<TagService>,
    cache: Arc<Cache>,
}

impl PostService {
    /// Create a new post service
    pub fn new(
        post_repo: Arc<dyn PostRepository>,
        user_repo: Arc<dyn UserRepository>,
        tags: Arc<TagService>,
        cache: Arc<Cache>,
    ) -> Self {
        Self {
            post_repo,
            user_repo,
            tags,
            cache,
        }
    }

    /// Base filter for everything the caller may see right now
    pub fn filter_for(caller: &Caller) -> PostFilter {
        PostFilter::new(Visibility::for_caller(caller), Utc::now())
    }

    /// List posts matching a filter
    ///
    /// # Errors
    /// - `InvalidPage` if the page lies past the last page
    pub async fn list(
        &self,
        filter: &PostFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Post>, PostServiceError> {
        let total = self
            .post_repo
            .count(filter)
            .await
            .context("Failed to count posts")?;

        let page = PagedResult::new(Vec::new(), total, params);
        if !page.is_valid_page() {
            return Err(PostServiceError::InvalidPage);
        }

        let items = self
            .post_repo
            .list(filter, params.offset(), params.limit())
            .await
            .context("Failed to list posts")?;

        Ok(PagedResult { items, ..page })
    }

    /// List the caller's own posts, further restricted by `filter`
    pub async fn list_mine(
        &self,
        caller: &Caller,
        filter: PostFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Post>, PostServiceError> {
        let user = caller
            .user()
            .ok_or_else(|| PostServiceError::PermissionDenied(MINE_REQUIRES_LOGIN.to_string()))?;

        self.list(&filter.with_author(user.id), params).await
    }

    /// List every post carrying a tag
    pub async fn list_by_tag(
        &self,
        tag_id: i64,
        params: &ListParams,
    ) -> Result<PagedResult<Post>, PostServiceError> {
        self.tags.get_by_id(tag_id).await?;

        // Tag listings include drafts for every caller, unlike `list` and `get`.
        let filter = PostFilter::new(Visibility::Unrestricted, Utc::now()).with_tag(tag_id);
        self.list(&filter, params).await
    }

    /// Get a single post visible to the caller
    pub async fn get(&self, caller: &Caller, id: i64) -> Result<Post, PostServiceError> {
        self.post_repo
            .find(id, &Self::filter_for(caller))
            .await
            .context("Failed to get post")?
            .ok_or_else(|| PostServiceError::NotFound(NOT_FOUND.to_string()))
    }

    /// Create a post
    ///
    /// # Errors
    /// - `Unauthenticated` for anonymous callers
    /// - `PermissionDenied` if a non-staff caller names another author
    /// - `ValidationError` for invalid fields or an unknown author
    /// - `SlugExists` if the slug is taken
    pub async fn create(&self, caller: &Caller, draft: PostDraft) -> Result<Post, PostServiceError> {
        let user = caller.user().ok_or(PostServiceError::Unauthenticated)?;

        let author_id = match draft.author.as_deref() {
            Some(reference) => self.resolve_author(user, reference).await?.id,
            None => user.id,
        };

        validate_title(&draft.title)?;
        validate_slug(&draft.slug)?;
        validate_summary(&draft.summary)?;

        if self
            .post_repo
            .exists_by_slug(&draft.slug, None)
            .await
            .context("Failed to check slug uniqueness")?
        {
            return Err(PostServiceError::SlugExists(draft.slug));
        }

        let tag_ids = self.tags.resolve_names(&draft.tags).await?;

        let slug = draft.slug.clone();
        let mut input =
            CreatePostInput::new(author_id, draft.title, draft.slug, draft.summary, draft.content)
                .with_tag_ids(tag_ids);
        input.published_at = draft.published_at.map(|at| at.trunc_subsecs(6));

        let post = match self.post_repo.create(&input).await {
            Ok(post) => post,
            Err(e) if is_unique_violation(&e) => return Err(PostServiceError::SlugExists(slug)),
            Err(e) => return Err(e.context("Failed to create post").into()),
        };

        tracing::info!(post_id = post.id, author_id, "Created post '{}'", post.slug);
        self.invalidate().await;
        Ok(post)
    }

    /// Update a post
    ///
    /// A full update (`partial == false`) requires title, slug, summary and
    /// content; a partial update accepts any subset.
    pub async fn update(
        &self,
        caller: &Caller,
        id: i64,
        changes: PostChanges,
        partial: bool,
    ) -> Result<Post, PostServiceError> {
        let (user, existing) = self.authorize_mutation(caller, id).await?;

        if !partial {
            let mut missing = Vec::new();
            for (field, value) in [
                ("title", &changes.title),
                ("slug", &changes.slug),
                ("summary", &changes.summary),
                ("content", &changes.content),
            ] {
                if value.is_none() {
                    missing.push(field);
                }
            }
            if !missing.is_empty() {
                return Err(PostServiceError::ValidationError(format!(
                    "Missing required fields: {}",
                    missing.join(", ")
                )));
            }
        }

        let mut input = UpdatePostInput::new();

        if let Some(reference) = changes.author.as_deref() {
            let author = self.resolve_author(&user, reference).await?;
            if author.id != existing.author_id {
                input.author_id = Some(author.id);
            }
        }
        if let Some(title) = changes.title {
            validate_title(&title)?;
            input.title = Some(title);
        }
        if let Some(slug) = changes.slug {
            validate_slug(&slug)?;
            if slug != existing.slug
                && self
                    .post_repo
                    .exists_by_slug(&slug, Some(id))
                    .await
                    .context("Failed to check slug uniqueness")?
            {
                return Err(PostServiceError::SlugExists(slug));
            }
            input = input.with_slug(slug);
        }
        if let Some(summary) = changes.summary {
            validate_summary(&summary)?;
            input.summary = Some(summary);
        }
        input.content = changes.content;
        input.published_at = changes
            .published_at
            .map(|at| at.map(|at| at.trunc_subsecs(6)));
        if let Some(names) = changes.tags {
            input.tag_ids = Some(self.tags.resolve_names(&names).await?);
        }

        if !input.has_changes() {
            return Ok(existing);
        }

        let post = match self.post_repo.update(id, &input).await {
            Ok(post) => post,
            Err(e) if is_unique_violation(&e) => {
                return Err(PostServiceError::SlugExists(
                    input.slug.unwrap_or_default(),
                ))
            }
            Err(e) => return Err(e.context("Failed to update post").into()),
        };

        tracing::info!(post_id = id, user_id = user.id, "Updated post '{}'", post.slug);
        self.invalidate().await;
        Ok(post)
    }

    /// Delete a post
    pub async fn delete(&self, caller: &Caller, id: i64) -> Result<(), PostServiceError> {
        let (user, existing) = self.authorize_mutation(caller, id).await?;

        self.post_repo
            .delete(id)
            .await
            .context("Failed to delete post")?;

        tracing::info!(post_id = id, user_id = user.id, "Deleted post '{}'", existing.slug);
        self.invalidate().await;
        Ok(())
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    /// Anonymous callers are rejected before lookup, then the post must be
    /// visible and the caller must be staff or its author.
    async fn authorize_mutation(
        &self,
        caller: &Caller,
        id: i64,
    ) -> Result<(User, Post), PostServiceError> {
        let user = caller.user().ok_or(PostServiceError::Unauthenticated)?;
        let post = self.get(caller, id).await?;

        if !user.can_modify(post.author_id) {
            return Err(PostServiceError::PermissionDenied(NOT_ALLOWED.to_string()));
        }

        Ok((user.clone(), post))
    }

    /// Resolve an author reference. Non-staff users may only name themselves.
    async fn resolve_author(&self, caller: &User, reference: &str) -> Result<User, PostServiceError> {
        let email = author_email_from_reference(reference);

        if email.eq_ignore_ascii_case(&caller.email) {
            return Ok(caller.clone());
        }
        if !caller.is_staff {
            return Err(PostServiceError::PermissionDenied(
                "You can only publish posts as yourself".to_string(),
            ));
        }

        self.user_repo
            .get_by_email(&email)
            .await
            .context("Failed to get author")?
            .ok_or_else(|| {
                PostServiceError::ValidationError(format!("Unknown author '{}'", email))
            })
    }

    async fn invalidate(&self) {
        if let Err(e) = invalidate_content(&self.cache).await {
            tracing::warn!("Failed to invalidate cached post responses: {:#}", e);
        }
    }
}

/// Extract the email from `http://host/api/v1/users/{email}` or a bare email
pub fn author_email_from_reference(reference: &str) -> String {
    let trimmed = reference.trim().trim_end_matches('/');
    let tail = match trimmed.rfind("/users/") {
        Some(pos) => &trimmed[pos + "/users/".len()..],
        None => trimmed,
    };
    urlencoding::decode(tail)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| tail.to_string())
}

fn validate_title(title: &str) -> Result<(), PostServiceError> {
    if title.trim().is_empty() {
        return Err(PostServiceError::ValidationError(
            "Post title cannot be empty".to_string(),
        ));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(PostServiceError::ValidationError(format!(
            "Post title cannot be longer than {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(())
}

/// Slugs are non-empty runs of ASCII letters, digits, `-` and `_`
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn validate_slug(slug: &str) -> Result<(), PostServiceError> {
    if !is_valid_slug(slug) {
        return Err(PostServiceError::ValidationError(format!(
            "'{}' is not a valid slug: use letters, numbers, underscores or hyphens",
            slug
        )));
    }
    if slug.len() > MAX_SLUG_LEN {
        return Err(PostServiceError::ValidationError(format!(
            "Slug cannot be longer than {} characters",
            MAX_SLUG_LEN
        )));
    }
    Ok(())
}

fn validate_summary(summary: &str) -> Result<(), PostServiceError> {
    if summary.chars().count() > MAX_SUMMARY_LEN {
        return Err(PostServiceError::ValidationError(format!(
            "Summary cannot be longer than {} characters",
            MAX_SUMMARY_LEN
        )));
    }
    Ok(())
}
