//! API token model
//!
//! One token per user. Keys are random UUIDs rendered without hyphens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token presented in `Authorization: Token <key>`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiToken {
    pub key: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
}

impl ApiToken {
    /// Generate a fresh token for a user
    pub fn generate(user_id: i64) -> Self {
        Self {
            key: Uuid::new_v4().simple().to_string(),
            user_id,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_produces_distinct_hex_keys() {
        let a = ApiToken::generate(1);
        let b = ApiToken::generate(1);

        assert_eq!(a.key.len(), 32);
        assert!(a.key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.key, b.key);
        assert_eq!(a.user_id, 1);
    }
}
