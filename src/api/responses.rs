//! Shared API response types
//!
//! Wire representations of posts, tags and users. Timestamps are RFC 3339 in
//! UTC with microseconds and a `Z` suffix.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Post, ResponseShape, Tag, User};

/// Format a timestamp as `2021-01-10T09:00:00.000000Z`
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Absolute URL of a user resource
pub fn user_url(base: &str, email: &str) -> String {
    format!("{}/api/v1/users/{}", base, email)
}

// ============================================================================
// Post Response Types
// ============================================================================

/// Compact post representation used by list-type actions and create
#[derive(Debug, Serialize, Deserialize)]
pub struct PostSummary {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub summary: String,
    /// URL of the author's user resource
    pub author: String,
    pub published_at: Option<String>,
    /// Tag names
    pub tags: Vec<String>,
    pub created_at: String,
    pub modified_at: String,
}

/// Detailed post representation: the summary plus content
#[derive(Debug, Serialize, Deserialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub summary: PostSummary,
    pub content: String,
}

impl PostSummary {
    pub fn new(post: &Post, base: &str) -> Self {
        Self {
            id: post.id,
            title: post.title.clone(),
            slug: post.slug.clone(),
            summary: post.summary.clone(),
            author: user_url(base, &post.author_email),
            published_at: post.published_at.map(format_timestamp),
            tags: post.tag_names(),
            created_at: format_timestamp(post.created_at),
            modified_at: format_timestamp(post.modified_at),
        }
    }
}

/// A post in the shape selected for the request's action
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PostResponse {
    Compact(PostSummary),
    Detailed(PostDetail),
}

impl PostResponse {
    pub fn render(post: Post, shape: ResponseShape, base: &str) -> Self {
        let summary = PostSummary::new(&post, base);
        match shape {
            ResponseShape::Compact => PostResponse::Compact(summary),
            ResponseShape::Detailed => PostResponse::Detailed(PostDetail {
                summary,
                content: post.content,
            }),
        }
    }
}

// ============================================================================
// Tag and User Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct TagResponse {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

impl From<Tag> for TagResponse {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            created_at: format_timestamp(tag.created_at),
        }
    }
}

/// Public user representation
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
        }
    }
}
