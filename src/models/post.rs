//! Post model
//!
//! This module provides:
//! - `Post` entity, loaded together with its author's email and its tags
//! - Input types for creating and updating posts
//! - Pagination types for list queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Tag;

/// Post entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    /// Unique identifier
    pub id: i64,
    /// Author user ID
    pub author_id: i64,
    /// Author email, the external identity of the author
    pub author_email: String,
    /// Post title
    pub title: String,
    /// URL-friendly slug (unique)
    pub slug: String,
    /// Short summary shown in lists
    pub summary: String,
    /// Full content
    pub content: String,
    /// Publication timestamp; `None` or a future value means unpublished
    pub published_at: Option<DateTime<Utc>>,
    /// Tags attached to the post, ordered by name
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub modified_at: DateTime<Utc>,
}

impl Post {
    /// Whether the post is published as of `now`
    pub fn is_published(&self, now: DateTime<Utc>) -> bool {
        matches!(self.published_at, Some(at) if at <= now)
    }

    /// Tag names in display order
    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.name.clone()).collect()
    }

    /// Whether the post carries the tag with the given ID
    pub fn has_tag(&self, tag_id: i64) -> bool {
        self.tags.iter().any(|t| t.id == tag_id)
    }
}

/// Input for creating a new post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostInput {
    pub author_id: i64,
    pub title: String,
    pub slug: String,
    pub summary: String,
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    /// IDs of existing tags to attach
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

impl CreatePostInput {
    /// Create a new CreatePostInput without tags or publication date
    pub fn new(
        author_id: i64,
        title: String,
        slug: String,
        summary: String,
        content: String,
    ) -> Self {
        Self {
            author_id,
            title,
            slug,
            summary,
            content,
            published_at: None,
            tag_ids: Vec::new(),
        }
    }

    /// Set the publication timestamp
    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    /// Set the tags to attach
    pub fn with_tag_ids(mut self, tag_ids: Vec<i64>) -> Self {
        self.tag_ids = tag_ids;
        self
    }
}

/// Input for updating an existing post
///
/// `published_at` is doubly optional: `None` keeps the stored value,
/// `Some(None)` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePostInput {
    pub author_id: Option<i64>,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<Option<DateTime<Utc>>>,
    /// Replacement tag set
    pub tag_ids: Option<Vec<i64>>,
}

impl UpdatePostInput {
    /// Create a new empty UpdatePostInput
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the title
    pub fn with_title(mut self, title: String) -> Self {
        self.title = Some(title);
        self
    }

    /// Set the slug
    pub fn with_slug(mut self, slug: String) -> Self {
        self.slug = Some(slug);
        self
    }

    /// Set or clear the publication timestamp
    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    /// Replace the tag set
    pub fn with_tag_ids(mut self, tag_ids: Vec<i64>) -> Self {
        self.tag_ids = Some(tag_ids);
        self
    }

    /// Check if any field is set
    pub fn has_changes(&self) -> bool {
        self.author_id.is_some()
            || self.title.is_some()
            || self.slug.is_some()
            || self.summary.is_some()
            || self.content.is_some()
            || self.published_at.is_some()
            || self.tag_ids.is_some()
    }
}

/// Pagination parameters for list queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 100,
        }
    }
}

impl ListParams {
    /// Create new pagination parameters
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 1000),
        }
    }

    /// Calculate the offset for database queries
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }

    /// Get the limit for database queries
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    /// Items in the current page
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    /// Current page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
}

impl<T> PagedResult<T> {
    /// Create a new paginated result
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        }
    }

    /// Calculate the total number of pages
    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 || self.total <= 0 {
            return 0;
        }
        let per_page = i64::from(self.per_page);
        u32::try_from((self.total + per_page - 1) / per_page).unwrap_or(u32::MAX)
    }

    /// Check if there is a next page
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    /// Check if there is a previous page
    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    /// Page 1 always exists; any later page must hold at least one item
    pub fn is_valid_page(&self) -> bool {
        self.page == 1 || (self.page >= 1 && self.page <= self.total_pages())
    }

    /// Check if the result is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the number of items in the current page
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Convert the items while keeping the paging metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

impl<T> Default for PagedResult<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: 1,
            per_page: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_post(published_at: Option<DateTime<Utc>>) -> Post {
        let now = Utc::now();
        Post {
            id: 1,
            author_id: 1,
            author_email: "a@example.com".to_string(),
            title: "Title".to_string(),
            slug: "title".to_string(),
            summary: "Summary".to_string(),
            content: "Content".to_string(),
            published_at,
            tags: vec![Tag {
                id: 7,
                name: "rust".to_string(),
                created_at: now,
            }],
            created_at: now,
            modified_at: now,
        }
    }

    #[test]
    fn test_is_published() {
        let now = Utc::now();
        assert!(sample_post(Some(now)).is_published(now));
        assert!(sample_post(Some(now - Duration::days(1))).is_published(now));
        assert!(!sample_post(Some(now + Duration::seconds(1))).is_published(now));
        assert!(!sample_post(None).is_published(now));
    }

    #[test]
    fn test_tags_helpers() {
        let post = sample_post(None);
        assert_eq!(post.tag_names(), vec!["rust".to_string()]);
        assert!(post.has_tag(7));
        assert!(!post.has_tag(8));
    }

    #[test]
    fn test_update_input_has_changes() {
        assert!(!UpdatePostInput::new().has_changes());
        assert!(UpdatePostInput::new().with_published_at(None).has_changes());
        assert!(UpdatePostInput::new()
            .with_title("New".to_string())
            .has_changes());
    }

    #[test]
    fn test_list_params_offset() {
        let params = ListParams::new(3, 10);
        assert_eq!(params.offset(), 20);
        assert_eq!(params.limit(), 10);

        let params = ListParams::new(0, 0);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 1);
    }

    #[test]
    fn test_paged_result_pages() {
        let params = ListParams::new(2, 10);
        let result = PagedResult::new(vec![1, 2, 3], 23, &params);
        assert_eq!(result.total_pages(), 3);
        assert!(result.has_next());
        assert!(result.has_prev());
        assert!(result.is_valid_page());

        let result = PagedResult::<i32>::new(vec![], 0, &ListParams::new(1, 10));
        assert_eq!(result.total_pages(), 0);
        assert!(result.is_valid_page());

        let result = PagedResult::<i32>::new(vec![], 5, &ListParams::new(2, 10));
        assert!(!result.is_valid_page());
    }

    #[test]
    fn test_paged_result_map_keeps_metadata() {
        let result = PagedResult::new(vec![1, 2], 12, &ListParams::new(1, 2));
        let mapped = result.map(|n| n * 10);
        assert_eq!(mapped.items, vec![10, 20]);
        assert_eq!(mapped.total, 12);
        assert_eq!(mapped.per_page, 2);
    }
}
