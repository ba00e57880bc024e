//! Tag repository
//!
//! This module provides:
//! - `TagRepository` trait defining the interface for tag data access
//! - `SqlxTagRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::Tag;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Create a new tag
    async fn create(&self, name: &str) -> Result<Tag>;

    /// Get tag by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    /// Get tag by name
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// List tags ordered by ID
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Tag>>;

    /// Count all tags
    async fn count(&self) -> Result<i64>;

    /// Rename a tag
    async fn update(&self, id: i64, name: &str) -> Result<Tag>;

    /// Delete a tag; its post associations go with it
    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based tag repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    /// Create a new SQLx tag repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, name: &str) -> Result<Tag> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_tag_sqlite(sqlite(self.pool.as_ref())?, name).await,
            DatabaseDriver::Mysql => create_tag_mysql(mysql(self.pool.as_ref())?, name).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_tag_by_id_sqlite(sqlite(self.pool.as_ref())?, id).await,
            DatabaseDriver::Mysql => get_tag_by_id_mysql(mysql(self.pool.as_ref())?, id).await,
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_tag_by_name_sqlite(sqlite(self.pool.as_ref())?, name).await
            }
            DatabaseDriver::Mysql => get_tag_by_name_mysql(mysql(self.pool.as_ref())?, name).await,
        }
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_tags_sqlite(sqlite(self.pool.as_ref())?, offset, limit).await
            }
            DatabaseDriver::Mysql => list_tags_mysql(mysql(self.pool.as_ref())?, offset, limit).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_tags_sqlite(sqlite(self.pool.as_ref())?).await,
            DatabaseDriver::Mysql => count_tags_mysql(mysql(self.pool.as_ref())?).await,
        }
    }

    async fn update(&self, id: i64, name: &str) -> Result<Tag> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_tag_sqlite(sqlite(self.pool.as_ref())?, id, name).await,
            DatabaseDriver::Mysql => update_tag_mysql(mysql(self.pool.as_ref())?, id, name).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => delete_tag_sqlite(sqlite(self.pool.as_ref())?, id).await,
            DatabaseDriver::Mysql => delete_tag_mysql(mysql(self.pool.as_ref())?, id).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_tag_sqlite(pool: &SqlitePool, name: &str) -> Result<Tag> {
    let now = Utc::now();

    let result = sqlx::query("INSERT INTO tags (name, created_at) VALUES (?, ?)")
        .bind(name)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create tag")?;

    Ok(Tag {
        id: result.last_insert_rowid(),
        name: name.to_string(),
        created_at: now,
    })
}

async fn get_tag_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Tag>> {
    let row = sqlx::query("SELECT id, name, created_at FROM tags WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by ID")?;

    row.as_ref().map(row_to_tag_sqlite).transpose()
}

async fn get_tag_by_name_sqlite(pool: &SqlitePool, name: &str) -> Result<Option<Tag>> {
    let row = sqlx::query("SELECT id, name, created_at FROM tags WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by name")?;

    row.as_ref().map(row_to_tag_sqlite).transpose()
}

async fn list_tags_sqlite(pool: &SqlitePool, offset: i64, limit: i64) -> Result<Vec<Tag>> {
    let rows = sqlx::query("SELECT id, name, created_at FROM tags ORDER BY id LIMIT ? OFFSET ?")
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list tags")?;

    rows.iter().map(row_to_tag_sqlite).collect()
}

async fn count_tags_sqlite(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM tags")
        .fetch_one(pool)
        .await
        .context("Failed to count tags")?;
    Ok(row.get("count"))
}

async fn update_tag_sqlite(pool: &SqlitePool, id: i64, name: &str) -> Result<Tag> {
    sqlx::query("UPDATE tags SET name = ? WHERE id = ?")
        .bind(name)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update tag")?;

    get_tag_by_id_sqlite(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Tag not found after update"))
}

async fn delete_tag_sqlite(pool: &SqlitePool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM tags WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete tag")?;

    Ok(())
}

fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Tag> {
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_tag_mysql(pool: &MySqlPool, name: &str) -> Result<Tag> {
    let now = Utc::now();

    let result = sqlx::query("INSERT INTO tags (name, created_at) VALUES (?, ?)")
        .bind(name)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create tag")?;

    Ok(Tag {
        id: result.last_insert_id() as i64,
        name: name.to_string(),
        created_at: now,
    })
}

async fn get_tag_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Tag>> {
    let row = sqlx::query("SELECT id, name, created_at FROM tags WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by ID")?;

    row.as_ref().map(row_to_tag_mysql).transpose()
}

async fn get_tag_by_name_mysql(pool: &MySqlPool, name: &str) -> Result<Option<Tag>> {
    let row = sqlx::query("SELECT id, name, created_at FROM tags WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get tag by name")?;

    row.as_ref().map(row_to_tag_mysql).transpose()
}

async fn list_tags_mysql(pool: &MySqlPool, offset: i64, limit: i64) -> Result<Vec<Tag>> {
    let rows = sqlx::query("SELECT id, name, created_at FROM tags ORDER BY id LIMIT ? OFFSET ?")
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list tags")?;

    rows.iter().map(row_to_tag_mysql).collect()
}

async fn count_tags_mysql(pool: &MySqlPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM tags")
        .fetch_one(pool)
        .await
        .context("Failed to count tags")?;
    Ok(row.get("count"))
}

async fn update_tag_mysql(pool: &MySqlPool, id: i64, name: &str) -> Result<Tag> {
    sqlx::query("UPDATE tags SET name = ? WHERE id = ?")
        .bind(name)
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update tag")?;

    get_tag_by_id_mysql(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Tag not found after update"))
}

async fn delete_tag_mysql(pool: &MySqlPool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM tags WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to delete tag")?;

    Ok(())
}

fn row_to_tag_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Tag> {
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxTagRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxTagRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_get_tag() {
        let repo = setup_test_repo().await;

        let created = repo.create("django").await.expect("Failed to create tag");
        assert!(created.id > 0);
        assert_eq!(created.name, "django");

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.name, "django");

        let by_name = repo.get_by_name("django").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
    }

    #[tokio::test]
    async fn test_duplicate_name_fails() {
        let repo = setup_test_repo().await;
        repo.create("rust").await.unwrap();
        assert!(repo.create("rust").await.is_err());
    }

    #[tokio::test]
    async fn test_list_and_count() {
        let repo = setup_test_repo().await;
        for name in ["a", "b", "c"] {
            repo.create(name).await.unwrap();
        }

        assert_eq!(repo.count().await.unwrap(), 3);

        let first_two = repo.list(0, 2).await.unwrap();
        let names: Vec<&str> = first_two.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let rest = repo.list(2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].name, "c");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = setup_test_repo().await;
        let tag = repo.create("old").await.unwrap();

        let renamed = repo.update(tag.id, "new").await.unwrap();
        assert_eq!(renamed.name, "new");
        assert!(repo.get_by_name("old").await.unwrap().is_none());

        repo.delete(tag.id).await.unwrap();
        assert!(repo.get_by_id(tag.id).await.unwrap().is_none());
    }
}
