//! User service
//!
//! Implements business logic for users and token authentication:
//! - Registration (the first registered user becomes staff)
//! - Token issuance from email + password
//! - Token validation for incoming requests
//! - Lookup by email, the public identity of a user

use crate::db::repositories::{is_unique_violation, TokenRepository, UserRepository};
use crate::models::{ApiToken, CreateUserInput, User};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use std::sync::Arc;

/// Message returned for any failed credential check
const INVALID_CREDENTIALS: &str = "Unable to log in with provided credentials.";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("{0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// User already exists
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing users and tokens
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    token_repo: Arc<dyn TokenRepository>,
}

impl UserService {
    /// Create a new user service with the given repositories
    pub fn new(user_repo: Arc<dyn UserRepository>, token_repo: Arc<dyn TokenRepository>) -> Self {
        Self {
            user_repo,
            token_repo,
        }
    }

    /// Register a new user
    ///
    /// # Errors
    ///
    /// - `ValidationError` if the email is malformed or the password is empty
    /// - `UserExists` if the email is already registered
    /// - `InternalError` for database errors
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let email = input.email.trim().to_string();
        validate_email(&email)?;
        if input.password.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Password cannot be empty".to_string(),
            ));
        }

        if self
            .user_repo
            .exists_by_email(&email)
            .await
            .context("Failed to check email")?
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let is_staff = self.is_first_user().await?;
        let password_hash = hash_password(&input.password).context("Failed to hash password")?;

        let created = self
            .user_repo
            .create(&CreateUserInput {
                email: email.clone(),
                password_hash,
                first_name: input.first_name,
                last_name: input.last_name,
                is_staff,
            })
            .await;
        let user = match created {
            Ok(user) => user,
            Err(e) if is_unique_violation(&e) => {
                return Err(UserServiceError::UserExists(format!(
                    "Email '{}' is already registered",
                    email
                )))
            }
            Err(e) => return Err(e.context("Failed to create user").into()),
        };

        tracing::info!(user_id = user.id, is_staff, "Registered user {}", user.email);
        Ok(user)
    }

    /// Exchange credentials for the user's API token, creating it on first use
    pub async fn obtain_token(&self, input: LoginInput) -> Result<ApiToken, UserServiceError> {
        let user = self
            .user_repo
            .get_by_email(input.email.trim())
            .await
            .context("Failed to get user")?
            .ok_or_else(|| UserServiceError::AuthenticationError(INVALID_CREDENTIALS.to_string()))?;

        let valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !valid || !user.is_active {
            tracing::debug!("Rejected token request for {}", user.email);
            return Err(UserServiceError::AuthenticationError(
                INVALID_CREDENTIALS.to_string(),
            ));
        }

        if let Some(token) = self
            .token_repo
            .get_by_user(user.id)
            .await
            .context("Failed to get token")?
        {
            return Ok(token);
        }

        let token = self
            .token_repo
            .create(&ApiToken::generate(user.id))
            .await
            .context("Failed to create token")?;
        Ok(token)
    }

    /// Resolve a token key to its active user
    ///
    /// Returns `Ok(None)` for unknown keys and inactive users.
    pub async fn authenticate_token(&self, key: &str) -> Result<Option<User>, UserServiceError> {
        let Some(token) = self
            .token_repo
            .get_by_key(key)
            .await
            .context("Failed to get token")?
        else {
            return Ok(None);
        };

        let user = self
            .user_repo
            .get_by_id(token.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user.filter(|u| u.is_active))
    }

    /// Get a user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user")?)
    }

    /// Get a user by email
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to get user by email")?)
    }

    /// Check if no user has registered yet
    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self
            .user_repo
            .count()
            .await
            .context("Failed to count users")?;
        Ok(count == 0)
    }
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(|c| c.is_whitespace() || c == '/')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(UserServiceError::ValidationError(format!(
            "'{}' is not a valid email address",
            email
        )))
    }
}

/// Input for user registration
#[derive(Debug, Clone, Default)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl RegisterInput {
    /// Create a new registration input without names
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            ..Self::default()
        }
    }
}

/// Credentials for obtaining a token
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl LoginInput {
    /// Create a new login input
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}
