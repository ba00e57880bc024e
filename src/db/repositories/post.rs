//! Post repository
//!
//! Database operations for posts.
//!
//! This module provides:
//! - `PostRepository` trait defining the interface for post data access
//! - `SqlxPostRepository` implementing the trait for SQLite and MySQL
//!
//! Listing queries are built from a `PostFilter` with `sqlx::QueryBuilder`;
//! the generated conditions mirror `PostFilter::matches`.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{CreatePostInput, Post, PostFilter, Tag, UpdatePostInput, Visibility};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Database, Encode, MySql, MySqlPool, QueryBuilder, Row, Sqlite, SqlitePool, Type};
use std::collections::HashMap;
use std::sync::Arc;

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Create a new post and attach its tags
    async fn create(&self, input: &CreatePostInput) -> Result<Post>;

    /// Get post by ID, ignoring visibility
    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    /// Get post by ID if it satisfies the filter
    async fn find(&self, id: i64, filter: &PostFilter) -> Result<Option<Post>>;

    /// List posts satisfying the filter, in filter order
    async fn list(&self, filter: &PostFilter, offset: i64, limit: i64) -> Result<Vec<Post>>;

    /// Count posts satisfying the filter
    async fn count(&self, filter: &PostFilter) -> Result<i64>;

    /// Update a post; a present tag list replaces the stored one
    async fn update(&self, id: i64, input: &UpdatePostInput) -> Result<Post>;

    /// Delete a post; its tag associations go with it
    async fn delete(&self, id: i64) -> Result<()>;

    /// Check if a slug is taken, optionally ignoring one post
    async fn exists_by_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool>;
}

/// SQLx-based post repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    /// Create a new SQLx post repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, input: &CreatePostInput) -> Result<Post> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_post_sqlite(sqlite(self.pool.as_ref())?, input).await,
            DatabaseDriver::Mysql => create_post_mysql(mysql(self.pool.as_ref())?, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let unrestricted = PostFilter::new(Visibility::Unrestricted, Utc::now());
        self.find(id, &unrestricted).await
    }

    async fn find(&self, id: i64, filter: &PostFilter) -> Result<Option<Post>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                find_post_sqlite(sqlite(self.pool.as_ref())?, id, filter).await
            }
            DatabaseDriver::Mysql => find_post_mysql(mysql(self.pool.as_ref())?, id, filter).await,
        }
    }

    async fn list(&self, filter: &PostFilter, offset: i64, limit: i64) -> Result<Vec<Post>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_posts_sqlite(sqlite(self.pool.as_ref())?, filter, offset, limit).await
            }
            DatabaseDriver::Mysql => {
                list_posts_mysql(mysql(self.pool.as_ref())?, filter, offset, limit).await
            }
        }
    }

    async fn count(&self, filter: &PostFilter) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_posts_sqlite(sqlite(self.pool.as_ref())?, filter).await,
            DatabaseDriver::Mysql => count_posts_mysql(mysql(self.pool.as_ref())?, filter).await,
        }
    }

    async fn update(&self, id: i64, input: &UpdatePostInput) -> Result<Post> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_post_sqlite(sqlite(self.pool.as_ref())?, id, input).await
            }
            DatabaseDriver::Mysql => update_post_mysql(mysql(self.pool.as_ref())?, id, input).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_post_sqlite(sqlite(self.pool.as_ref())?, id).await,
            DatabaseDriver::Mysql => delete_post_mysql(mysql(self.pool.as_ref())?, id).await,
        }
    }

    async fn exists_by_slug(&self, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                exists_by_slug_sqlite(sqlite(self.pool.as_ref())?, slug, exclude_id).await
            }
            DatabaseDriver::Mysql => {
                exists_by_slug_mysql(mysql(self.pool.as_ref())?, slug, exclude_id).await
            }
        }
    }
}

// ============================================================================
// Filter translation (shared by both drivers)
// ============================================================================

const SELECT_POSTS: &str = "SELECT p.id, p.author_id, u.email AS author_email, p.title, p.slug, \
     p.summary, p.content, p.published_at, p.created_at, p.modified_at \
     FROM posts p JOIN users u ON u.id = p.author_id WHERE 1=1";

const COUNT_POSTS: &str =
    "SELECT COUNT(*) AS count FROM posts p JOIN users u ON u.id = p.author_id WHERE 1=1";

/// Append the `AND ...` conditions equivalent to `PostFilter::matches`
fn push_filter_conditions<'a, DB>(qb: &mut QueryBuilder<'a, DB>, filter: &PostFilter)
where
    DB: Database,
    i64: Encode<'a, DB> + Type<DB>,
    String: Encode<'a, DB> + Type<DB>,
    DateTime<Utc>: Encode<'a, DB> + Type<DB>,
{
    match filter.visibility {
        Visibility::Published => {
            qb.push(" AND p.published_at IS NOT NULL AND p.published_at <= ");
            qb.push_bind(filter.now);
        }
        Visibility::Unrestricted => {}
        Visibility::PublishedOrAuthor(author_id) => {
            qb.push(" AND ((p.published_at IS NOT NULL AND p.published_at <= ");
            qb.push_bind(filter.now);
            qb.push(") OR p.author_id = ");
            qb.push_bind(author_id);
            qb.push(")");
        }
    }

    if let Some(window) = filter.window {
        let (from, until) = window.bounds(filter.now);
        qb.push(" AND p.published_at IS NOT NULL AND p.published_at >= ");
        qb.push_bind(from);
        if let Some(until) = until {
            qb.push(" AND p.published_at < ");
            qb.push_bind(until);
        }
    }

    if let Some(author_id) = filter.author_id {
        qb.push(" AND p.author_id = ");
        qb.push_bind(author_id);
    }

    if let Some(tag_id) = filter.tag_id {
        qb.push(" AND EXISTS (SELECT 1 FROM post_tags pt WHERE pt.post_id = p.id AND pt.tag_id = ");
        qb.push_bind(tag_id);
        qb.push(")");
    }

    if let Some(needle) = &filter.author_email_contains {
        qb.push(" AND INSTR(LOWER(u.email), ");
        qb.push_bind(needle.to_lowercase());
        qb.push(") > 0");
    }

    if let Some(from) = filter.published_from_bound() {
        qb.push(" AND p.published_at IS NOT NULL AND p.published_at >= ");
        qb.push_bind(from);
    }

    if let Some(until) = filter.published_to_bound() {
        qb.push(" AND p.published_at IS NOT NULL AND p.published_at < ");
        qb.push_bind(until);
    }
}

fn push_ordering<DB: Database>(qb: &mut QueryBuilder<'_, DB>, filter: &PostFilter) {
    match &filter.ordering {
        Some(ordering) => {
            qb.push(" ORDER BY ");
            qb.push(ordering.to_sql());
        }
        None => {
            qb.push(" ORDER BY p.id ASC");
        }
    }
}

fn unique_tag_ids(tag_ids: &[i64]) -> Vec<i64> {
    let mut ids = tag_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn group_tags(rows: Vec<(i64, Tag)>, posts: &mut [Post]) {
    let mut by_post: HashMap<i64, Vec<Tag>> = HashMap::new();
    for (post_id, tag) in rows {
        by_post.entry(post_id).or_default().push(tag);
    }
    for post in posts {
        post.tags = by_post.remove(&post.id).unwrap_or_default();
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_post_sqlite(pool: &SqlitePool, input: &CreatePostInput) -> Result<Post> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(
        r#"
        INSERT INTO posts (author_id, title, slug, summary, content, published_at, created_at, modified_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(input.author_id)
    .bind(&input.title)
    .bind(&input.slug)
    .bind(&input.summary)
    .bind(&input.content)
    .bind(input.published_at)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create post")?;

    let id = result.last_insert_rowid();

    for tag_id in unique_tag_ids(&input.tag_ids) {
        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to attach tag to post")?;
    }

    tx.commit().await.context("Failed to commit post")?;

    find_post_sqlite(pool, id, &PostFilter::new(Visibility::Unrestricted, now))
        .await?
        .ok_or_else(|| anyhow::anyhow!("Post not found after create"))
}

async fn find_post_sqlite(pool: &SqlitePool, id: i64, filter: &PostFilter) -> Result<Option<Post>> {
    let mut qb = QueryBuilder::<Sqlite>::new(SELECT_POSTS);
    push_filter_conditions(&mut qb, filter);
    qb.push(" AND p.id = ");
    qb.push_bind(id);

    let row = qb
        .build()
        .fetch_optional(pool)
        .await
        .context("Failed to get post")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut posts = vec![row_to_post_sqlite(&row)?];
    attach_tags_sqlite(pool, &mut posts).await?;
    Ok(posts.pop())
}

async fn list_posts_sqlite(
    pool: &SqlitePool,
    filter: &PostFilter,
    offset: i64,
    limit: i64,
) -> Result<Vec<Post>> {
    let mut qb = QueryBuilder::<Sqlite>::new(SELECT_POSTS);
    push_filter_conditions(&mut qb, filter);
    push_ordering(&mut qb, filter);
    qb.push(" LIMIT ");
    qb.push_bind(limit);
    qb.push(" OFFSET ");
    qb.push_bind(offset);

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    let mut posts = rows
        .iter()
        .map(row_to_post_sqlite)
        .collect::<Result<Vec<_>>>()?;
    attach_tags_sqlite(pool, &mut posts).await?;
    Ok(posts)
}

async fn count_posts_sqlite(pool: &SqlitePool, filter: &PostFilter) -> Result<i64> {
    let mut qb = QueryBuilder::<Sqlite>::new(COUNT_POSTS);
    push_filter_conditions(&mut qb, filter);

    let row = qb
        .build()
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?;
    Ok(row.get("count"))
}

async fn attach_tags_sqlite(pool: &SqlitePool, posts: &mut [Post]) -> Result<()> {
    if posts.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT pt.post_id, t.id, t.name, t.created_at \
         FROM post_tags pt JOIN tags t ON t.id = pt.tag_id WHERE pt.post_id IN (",
    );
    let mut ids = qb.separated(", ");
    for post in posts.iter() {
        ids.push_bind(post.id);
    }
    ids.push_unseparated(") ORDER BY t.name, t.id");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to load post tags")?;

    let mut tags = Vec::with_capacity(rows.len());
    for row in &rows {
        let post_id: i64 = row.try_get("post_id")?;
        let tag = Tag {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        };
        tags.push((post_id, tag));
    }

    group_tags(tags, posts);
    Ok(())
}

async fn update_post_sqlite(pool: &SqlitePool, id: i64, input: &UpdatePostInput) -> Result<Post> {
    let now = Utc::now();
    let unrestricted = PostFilter::new(Visibility::Unrestricted, now);
    let existing = find_post_sqlite(pool, id, &unrestricted)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Post not found"))?;

    let author_id = input.author_id.unwrap_or(existing.author_id);
    let title = input.title.as_ref().unwrap_or(&existing.title);
    let slug = input.slug.as_ref().unwrap_or(&existing.slug);
    let summary = input.summary.as_ref().unwrap_or(&existing.summary);
    let content = input.content.as_ref().unwrap_or(&existing.content);
    let published_at = input.published_at.unwrap_or(existing.published_at);

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(
        r#"
        UPDATE posts
        SET author_id = ?, title = ?, slug = ?, summary = ?, content = ?, published_at = ?, modified_at = ?
        WHERE id = ?
        "#,
    )
    .bind(author_id)
    .bind(title)
    .bind(slug)
    .bind(summary)
    .bind(content)
    .bind(published_at)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await
    .context("Failed to update post")?;

    if let Some(tag_ids) = &input.tag_ids {
        sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear post tags")?;

        for tag_id in unique_tag_ids(tag_ids) {
            sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
                .bind(id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await
                .context("Failed to attach tag to post")?;
        }
    }

    tx.commit().await.context("Failed to commit post update")?;

    find_post_sqlite(pool, id, &unrestricted)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Post not found after update"))
}

async fn delete_post_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete post")?;

    Ok(())
}

async fn exists_by_slug_sqlite(pool: &SqlitePool, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM posts WHERE slug = ? AND id != ?")
        .bind(slug)
        .bind(exclude_id.unwrap_or(0))
        .fetch_one(pool)
        .await
        .context("Failed to check slug")?;

    let count: i64 = row.get("count");
    Ok(count > 0)
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        author_id: row.try_get("author_id")?,
        author_email: row.try_get("author_email")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        summary: row.try_get("summary")?,
        content: row.try_get("content")?,
        published_at: row.try_get("published_at")?,
        tags: Vec::new(),
        created_at: row.try_get("created_at")?,
        modified_at: row.try_get("modified_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_post_mysql(pool: &MySqlPool, input: &CreatePostInput) -> Result<Post> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(
        r#"
        INSERT INTO posts (author_id, title, slug, summary, content, published_at, created_at, modified_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(input.author_id)
    .bind(&input.title)
    .bind(&input.slug)
    .bind(&input.summary)
    .bind(&input.content)
    .bind(input.published_at)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create post")?;

    let id = result.last_insert_id() as i64;

    for tag_id in unique_tag_ids(&input.tag_ids) {
        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(id)
            .bind(tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to attach tag to post")?;
    }

    tx.commit().await.context("Failed to commit post")?;

    find_post_mysql(pool, id, &PostFilter::new(Visibility::Unrestricted, now))
        .await?
        .ok_or_else(|| anyhow::anyhow!("Post not found after create"))
}

async fn find_post_mysql(pool: &MySqlPool, id: i64, filter: &PostFilter) -> Result<Option<Post>> {
    let mut qb = QueryBuilder::<MySql>::new(SELECT_POSTS);
    push_filter_conditions(&mut qb, filter);
    qb.push(" AND p.id = ");
    qb.push_bind(id);

    let row = qb
        .build()
        .fetch_optional(pool)
        .await
        .context("Failed to get post")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut posts = vec![row_to_post_mysql(&row)?];
    attach_tags_mysql(pool, &mut posts).await?;
    Ok(posts.pop())
}

async fn list_posts_mysql(
    pool: &MySqlPool,
    filter: &PostFilter,
    offset: i64,
    limit: i64,
) -> Result<Vec<Post>> {
    let mut qb = QueryBuilder::<MySql>::new(SELECT_POSTS);
    push_filter_conditions(&mut qb, filter);
    push_ordering(&mut qb, filter);
    qb.push(" LIMIT ");
    qb.push_bind(limit);
    qb.push(" OFFSET ");
    qb.push_bind(offset);

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    let mut posts = rows
        .iter()
        .map(row_to_post_mysql)
        .collect::<Result<Vec<_>>>()?;
    attach_tags_mysql(pool, &mut posts).await?;
    Ok(posts)
}

async fn count_posts_mysql(pool: &MySqlPool, filter: &PostFilter) -> Result<i64> {
    let mut qb = QueryBuilder::<MySql>::new(COUNT_POSTS);
    push_filter_conditions(&mut qb, filter);

    let row = qb
        .build()
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?;
    Ok(row.get("count"))
}

async fn attach_tags_mysql(pool: &MySqlPool, posts: &mut [Post]) -> Result<()> {
    if posts.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::<MySql>::new(
        "SELECT pt.post_id, t.id, t.name, t.created_at \
         FROM post_tags pt JOIN tags t ON t.id = pt.tag_id WHERE pt.post_id IN (",
    );
    let mut ids = qb.separated(", ");
    for post in posts.iter() {
        ids.push_bind(post.id);
    }
    ids.push_unseparated(") ORDER BY t.name, t.id");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to load post tags")?;

    let mut tags = Vec::with_capacity(rows.len());
    for row in &rows {
        let post_id: i64 = row.try_get("post_id")?;
        let tag = Tag {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        };
        tags.push((post_id, tag));
    }

    group_tags(tags, posts);
    Ok(())
}

async fn update_post_mysql(pool: &MySqlPool, id: i64, input: &UpdatePostInput) -> Result<Post> {
    let now = Utc::now();
    let unrestricted = PostFilter::new(Visibility::Unrestricted, now);
    let existing = find_post_mysql(pool, id, &unrestricted)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Post not found"))?;

    let author_id = input.author_id.unwrap_or(existing.author_id);
    let title = input.title.as_ref().unwrap_or(&existing.title);
    let slug = input.slug.as_ref().unwrap_or(&existing.slug);
    let summary = input.summary.as_ref().unwrap_or(&existing.summary);
    let content = input.content.as_ref().unwrap_or(&existing.content);
    let published_at = input.published_at.unwrap_or(existing.published_at);

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(
        r#"
        UPDATE posts
        SET author_id = ?, title = ?, slug = ?, summary = ?, content = ?, published_at = ?, modified_at = ?
        WHERE id = ?
        "#,
    )
    .bind(author_id)
    .bind(title)
    .bind(slug)
    .bind(summary)
    .bind(content)
    .bind(published_at)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await
    .context("Failed to update post")?;

    if let Some(tag_ids) = &input.tag_ids {
        sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear post tags")?;

        for tag_id in unique_tag_ids(tag_ids) {
            sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
                .bind(id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await
                .context("Failed to attach tag to post")?;
        }
    }

    tx.commit().await.context("Failed to commit post update")?;

    find_post_mysql(pool, id, &unrestricted)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Post not found after update"))
}

async fn delete_post_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete post")?;

    Ok(())
}

async fn exists_by_slug_mysql(pool: &MySqlPool, slug: &str, exclude_id: Option<i64>) -> Result<bool> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM posts WHERE slug = ? AND id != ?")
        .bind(slug)
        .bind(exclude_id.unwrap_or(0))
        .fetch_one(pool)
        .await
        .context("Failed to check slug")?;

    let count: i64 = row.get("count");
    Ok(count > 0)
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        author_id: row.try_get("author_id")?,
        author_email: row.try_get("author_email")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        summary: row.try_get("summary")?,
        content: row.try_get("content")?,
        published_at: row.try_get("published_at")?,
        tags: Vec::new(),
        created_at: row.try_get("created_at")?,
        modified_at: row.try_get("modified_at")?,
    })
}
