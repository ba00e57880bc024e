//! Tag service
//!
//! Implements business logic for tag management:
//! - Tag CRUD with unique names
//! - Resolving tag names on posts, creating unknown tags on the fly
//! - Cache invalidation after renames and deletions

use crate::cache::{invalidate_content, Cache};
use crate::db::repositories::{is_unique_violation, TagRepository};
use crate::models::{ListParams, PagedResult, Tag};
use anyhow::Context;
use std::sync::Arc;

/// Longest accepted tag name
const MAX_TAG_NAME_LEN: usize = 100;

/// Error types for tag service operations
#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    /// Tag not found
    #[error("Tag not found: {0}")]
    NotFound(i64),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Another tag already uses the name
    #[error("Tag '{0}' already exists")]
    AlreadyExists(String),

    /// Page number outside the result set
    #[error("Invalid page.")]
    InvalidPage,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Tag service for managing blog tags
pub struct TagService {
    repo: Arc<dyn TagRepository>,
    cache: Arc<Cache>,
}

impl TagService {
    /// Create a new tag service
    pub fn new(repo: Arc<dyn TagRepository>, cache: Arc<Cache>) -> Self {
        Self { repo, cache }
    }

    /// List tags ordered by ID
    ///
    /// # Errors
    /// - `InvalidPage` if the page lies past the last page
    pub async fn list(&self, params: &ListParams) -> Result<PagedResult<Tag>, TagServiceError> {
        let total = self.repo.count().await.context("Failed to count tags")?;

        let page = PagedResult::new(Vec::new(), total, params);
        if !page.is_valid_page() {
            return Err(TagServiceError::InvalidPage);
        }

        let items = self
            .repo
            .list(params.offset(), params.limit())
            .await
            .context("Failed to list tags")?;
        Ok(PagedResult { items, ..page })
    }

    /// Get tag by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Tag, TagServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get tag")?
            .ok_or(TagServiceError::NotFound(id))
    }

    /// Create a tag with a new, unique name
    pub async fn create(&self, name: &str) -> Result<Tag, TagServiceError> {
        let name = validate_name(name)?;

        if self
            .repo
            .get_by_name(name)
            .await
            .context("Failed to check existing tag")?
            .is_some()
        {
            return Err(TagServiceError::AlreadyExists(name.to_string()));
        }

        let tag = match self.repo.create(name).await {
            Ok(tag) => tag,
            Err(e) if is_unique_violation(&e) => {
                return Err(TagServiceError::AlreadyExists(name.to_string()))
            }
            Err(e) => return Err(e.context("Failed to create tag").into()),
        };
        self.invalidate().await;
        Ok(tag)
    }

    /// Rename a tag
    pub async fn update(&self, id: i64, name: &str) -> Result<Tag, TagServiceError> {
        let name = validate_name(name)?;
        self.get_by_id(id).await?;

        if let Some(existing) = self
            .repo
            .get_by_name(name)
            .await
            .context("Failed to check existing tag")?
        {
            if existing.id != id {
                return Err(TagServiceError::AlreadyExists(name.to_string()));
            }
        }

        let tag = match self.repo.update(id, name).await {
            Ok(tag) => tag,
            Err(e) if is_unique_violation(&e) => {
                return Err(TagServiceError::AlreadyExists(name.to_string()))
            }
            Err(e) => return Err(e.context("Failed to update tag").into()),
        };
        self.invalidate().await;
        Ok(tag)
    }

    /// Delete a tag; posts that carried it are kept
    pub async fn delete(&self, id: i64) -> Result<(), TagServiceError> {
        self.get_by_id(id).await?;
        self.repo.delete(id).await.context("Failed to delete tag")?;
        tracing::info!(tag_id = id, "Deleted tag");
        self.invalidate().await;
        Ok(())
    }

    /// Resolve tag names to IDs, creating missing tags
    pub async fn resolve_names(&self, names: &[String]) -> Result<Vec<i64>, TagServiceError> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let name = validate_name(name)?;
            let tag = match self
                .repo
                .get_by_name(name)
                .await
                .context("Failed to check existing tag")?
            {
                Some(tag) => tag,
                None => self.create_or_fetch(name).await?,
            };
            if !ids.contains(&tag.id) {
                ids.push(tag.id);
            }
        }
        Ok(ids)
    }

    /// Insert a tag, or load it if a concurrent request inserted it first
    async fn create_or_fetch(&self, name: &str) -> Result<Tag, TagServiceError> {
        tracing::debug!("Creating tag '{}'", name);
        match self.repo.create(name).await {
            Ok(tag) => Ok(tag),
            Err(e) if is_unique_violation(&e) => self
                .repo
                .get_by_name(name)
                .await
                .context("Failed to load existing tag")?
                .ok_or_else(|| TagServiceError::InternalError(e.context("Tag vanished after conflict"))),
            Err(e) => Err(e.context("Failed to create tag").into()),
        }
    }

    async fn invalidate(&self) {
        if let Err(e) = invalidate_content(&self.cache).await {
            tracing::warn!("Failed to invalidate cached tag responses: {:#}", e);
        }
    }
}

fn validate_name(name: &str) -> Result<&str, TagServiceError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(TagServiceError::ValidationError(
            "Tag name cannot be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_TAG_NAME_LEN {
        return Err(TagServiceError::ValidationError(format!(
            "Tag name cannot be longer than {} characters",
            MAX_TAG_NAME_LEN
        )));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::repositories::SqlxTagRepository;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_service() -> TagService {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let cache = create_cache(&CacheConfig::default()).expect("Failed to create cache");
        TagService::new(SqlxTagRepository::boxed(pool), cache)
    }

    #[tokio::test]
    async fn test_create_trims_and_rejects_duplicates() {
        let service = setup_test_service().await;

        let tag = service.create("  rust ").await.expect("Failed to create tag");
        assert_eq!(tag.name, "rust");

        let dup = service.create("rust").await;
        assert!(matches!(dup, Err(TagServiceError::AlreadyExists(_))));

        let empty = service.create("   ").await;
        assert!(matches!(empty, Err(TagServiceError::ValidationError(_))));

        let long = service.create(&"x".repeat(MAX_TAG_NAME_LEN + 1)).await;
        assert!(matches!(long, Err(TagServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_update_conflicts_and_missing() {
        let service = setup_test_service().await;
        let a = service.create("a").await.unwrap();
        service.create("b").await.unwrap();

        let conflict = service.update(a.id, "b").await;
        assert!(matches!(conflict, Err(TagServiceError::AlreadyExists(_))));

        let same = service.update(a.id, "a").await.expect("Renaming to itself is allowed");
        assert_eq!(same.name, "a");

        let missing = service.update(999, "c").await;
        assert!(matches!(missing, Err(TagServiceError::NotFound(999))));
    }

    #[tokio::test]
    async fn test_delete() {
        let service = setup_test_service().await;
        let tag = service.create("gone").await.unwrap();

        service.delete(tag.id).await.expect("Failed to delete tag");
        assert!(matches!(
            service.get_by_id(tag.id).await,
            Err(TagServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.delete(tag.id).await,
            Err(TagServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_names_reuses_and_creates() {
        let service = setup_test_service().await;
        let existing = service.create("django").await.unwrap();

        let ids = service
            .resolve_names(&["django".to_string(), "rest".to_string(), "django".to_string()])
            .await
            .expect("Failed to resolve tags");

        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], existing.id);

        let listed = service.list(&ListParams::new(1, 10)).await.unwrap();
        assert_eq!(listed.total, 2);
    }

    #[tokio::test]
    async fn test_create_or_fetch_returns_tag_inserted_first() {
        let service = setup_test_service().await;
        let existing = service.create("python").await.unwrap();

        let fetched = service
            .create_or_fetch("python")
            .await
            .expect("A lost insert should load the stored tag");
        assert_eq!(fetched.id, existing.id);
    }

    #[tokio::test]
    async fn test_concurrent_resolve_names_share_one_tag() {
        let service = setup_test_service().await;

        for round in 0..20 {
            let names = vec![format!("shared-{}", round)];
            let (a, b) = tokio::join!(service.resolve_names(&names), service.resolve_names(&names));
            let a = a.expect("First resolve failed");
            let b = b.expect("Second resolve failed");
            assert_eq!(a, b);
        }

        let listed = service.list(&ListParams::new(1, 100)).await.unwrap();
        assert_eq!(listed.total, 20);
    }

    #[tokio::test]
    async fn test_concurrent_create_reports_conflict() {
        let service = setup_test_service().await;

        for round in 0..20 {
            let name = format!("race-{}", round);
            let (a, b) = tokio::join!(service.create(&name), service.create(&name));
            let created = [&a, &b].iter().filter(|r| r.is_ok()).count();
            assert_eq!(created, 1);
            for result in [a, b] {
                assert!(matches!(result, Ok(_) | Err(TagServiceError::AlreadyExists(_))));
            }
        }
    }

    #[tokio::test]
    async fn test_list_rejects_page_past_end() {
        let service = setup_test_service().await;
        service.create("only").await.unwrap();

        let first = service.list(&ListParams::new(1, 10)).await.unwrap();
        assert_eq!(first.items.len(), 1);

        let past_end = service.list(&ListParams::new(2, 10)).await;
        assert!(matches!(past_end, Err(TagServiceError::InvalidPage)));
    }
}
