//! API token repository
//!
//! Tokens never expire; each user holds at most one.

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::ApiToken;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Token repository trait
#[async_trait]
pub trait TokenRepository: Send + Sync {
    /// Store a new token
    async fn create(&self, token: &ApiToken) -> Result<ApiToken>;

    /// Look up a token by its key
    async fn get_by_key(&self, key: &str) -> Result<Option<ApiToken>>;

    /// Look up the token belonging to a user
    async fn get_by_user(&self, user_id: i64) -> Result<Option<ApiToken>>;
}

/// SQLx-based token repository implementation
pub struct SqlxTokenRepository {
    pool: DynDatabasePool,
}

impl SqlxTokenRepository {
    /// Create a new SQLx token repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TokenRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TokenRepository for SqlxTokenRepository {
    async fn create(&self, token: &ApiToken) -> Result<ApiToken> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_token_sqlite(sqlite(self.pool.as_ref())?, token).await,
            DatabaseDriver::Mysql => create_token_mysql(mysql(self.pool.as_ref())?, token).await,
        }
    }

    async fn get_by_key(&self, key: &str) -> Result<Option<ApiToken>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_token_by_key_sqlite(sqlite(self.pool.as_ref())?, key).await
            }
            DatabaseDriver::Mysql => get_token_by_key_mysql(mysql(self.pool.as_ref())?, key).await,
        }
    }

    async fn get_by_user(&self, user_id: i64) -> Result<Option<ApiToken>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_token_by_user_sqlite(sqlite(self.pool.as_ref())?, user_id).await
            }
            DatabaseDriver::Mysql => {
                get_token_by_user_mysql(mysql(self.pool.as_ref())?, user_id).await
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_token_sqlite(pool: &SqlitePool, token: &ApiToken) -> Result<ApiToken> {
    sqlx::query("INSERT INTO api_tokens (token_key, user_id, created_at) VALUES (?, ?, ?)")
        .bind(&token.key)
        .bind(token.user_id)
        .bind(token.created_at)
        .execute(pool)
        .await
        .context("Failed to create token")?;

    Ok(token.clone())
}

async fn get_token_by_key_sqlite(pool: &SqlitePool, key: &str) -> Result<Option<ApiToken>> {
    let row = sqlx::query("SELECT token_key, user_id, created_at FROM api_tokens WHERE token_key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get token by key")?;

    row.as_ref().map(row_to_token_sqlite).transpose()
}

async fn get_token_by_user_sqlite(pool: &SqlitePool, user_id: i64) -> Result<Option<ApiToken>> {
    let row = sqlx::query("SELECT token_key, user_id, created_at FROM api_tokens WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get token by user")?;

    row.as_ref().map(row_to_token_sqlite).transpose()
}

fn row_to_token_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<ApiToken> {
    Ok(ApiToken {
        key: row.try_get("token_key")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_token_mysql(pool: &MySqlPool, token: &ApiToken) -> Result<ApiToken> {
    sqlx::query("INSERT INTO api_tokens (token_key, user_id, created_at) VALUES (?, ?, ?)")
        .bind(&token.key)
        .bind(token.user_id)
        .bind(token.created_at)
        .execute(pool)
        .await
        .context("Failed to create token")?;

    Ok(token.clone())
}

async fn get_token_by_key_mysql(pool: &MySqlPool, key: &str) -> Result<Option<ApiToken>> {
    let row = sqlx::query("SELECT token_key, user_id, created_at FROM api_tokens WHERE token_key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .context("Failed to get token by key")?;

    row.as_ref().map(row_to_token_mysql).transpose()
}

async fn get_token_by_user_mysql(pool: &MySqlPool, user_id: i64) -> Result<Option<ApiToken>> {
    let row = sqlx::query("SELECT token_key, user_id, created_at FROM api_tokens WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get token by user")?;

    row.as_ref().map(row_to_token_mysql).transpose()
}

fn row_to_token_mysql(row: &sqlx::mysql::MySqlRow) -> Result<ApiToken> {
    Ok(ApiToken {
        key: row.try_get("token_key")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
    })
}
