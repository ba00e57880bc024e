//! User model
//!
//! Users are identified externally by their email address.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Email address (unique)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    /// Staff users may modify any post
    pub is_staff: bool,
    /// Inactive users cannot obtain or use tokens
    pub is_active: bool,
    /// Registration timestamp
    pub date_joined: DateTime<Utc>,
}

impl User {
    /// Check if the user may modify content owned by `author_id`
    ///
    /// Staff can modify anything; everyone else only their own content.
    pub fn can_modify(&self, author_id: i64) -> bool {
        self.is_staff || self.id == author_id
    }
}

/// Input for creating a user. The password must already be hashed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserInput {
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_staff: bool,
}
