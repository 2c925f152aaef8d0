//! User service
//!
//! Implements business logic for accounts and authentication:
//! - Login/logout with database-backed sessions
//! - Forced password change on first login
//! - Admin-managed account creation, editing and deletion
//! - Superadmin protection: exactly one superadmin exists, is never
//!   deleted or demoted, and is only editable by itself

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{CreateUserInput, Session, UpdateUserInput, User, UserRole};
use crate::services::password::{hash_password, verify_password};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Default session expiration time in days
const DEFAULT_SESSION_TTL_DAYS: i64 = 7;

/// Minimum length for a user-chosen password
pub const MIN_PASSWORD_LEN: usize = 6;

/// Username seeded for the initial superadmin account
pub const DEFAULT_SUPERADMIN_USERNAME: &str = "admin";

/// Password seeded for the initial superadmin account; must be changed on
/// first login
const DEFAULT_SUPERADMIN_PASSWORD: &str = "admin";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// User already exists
    #[error("User already exists: {0}")]
    UserExists(String),

    /// User not found
    #[error("User not found")]
    NotFound,

    /// Operation not permitted for this actor
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

impl LoginInput {
    /// Create a new login input
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// User service for managing accounts and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_ttl_days: i64,
}

impl UserService {
    /// Create a new user service with the given repositories
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_ttl_days: DEFAULT_SESSION_TTL_DAYS,
        }
    }

    /// Create a new user service with custom session expiration
    pub fn with_session_ttl(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_ttl_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_ttl_days,
        }
    }

    /// Login with credentials
    ///
    /// Validates the provided credentials and creates a new session if valid.
    /// Returns the session together with the user so callers can check the
    /// forced-password-change flag without a second lookup.
    ///
    /// Invalid username and invalid password produce the same error message.
    pub async fn login(&self, input: LoginInput) -> Result<(Session, User), UserServiceError> {
        let user = self
            .user_repo
            .get_by_username(&input.username)
            .await
            .context("Failed to get user by username")?
            .ok_or_else(|| {
                UserServiceError::AuthenticationError("Invalid username or password".to_string())
            })?;

        let password_valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;

        if !password_valid {
            return Err(UserServiceError::AuthenticationError(
                "Invalid username or password".to_string(),
            ));
        }

        let session = Session::new(user.id, self.session_ttl_days);
        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        Ok((created, user))
    }

    /// Logout (invalidate session)
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;

        Ok(())
    }

    /// Validate session token and return the associated user
    ///
    /// Expired sessions are deleted on sight and treated as absent.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            let _ = self.session_repo.delete(token).await;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user)
    }

    /// Change a user's own password and clear the forced-change flag
    ///
    /// Used by the first-login flow, so the current password is not asked
    /// again; the caller is already authenticated. All of the user's
    /// sessions are dropped, so other devices must log in again.
    pub async fn change_password(
        &self,
        user_id: i64,
        new_password: &str,
    ) -> Result<User, UserServiceError> {
        if new_password.len() < MIN_PASSWORD_LEN {
            return Err(UserServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        let user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or(UserServiceError::NotFound)?;

        let password_hash = hash_password(new_password).context("Failed to hash password")?;
        self.user_repo
            .update_password(user.id, &password_hash, false)
            .await
            .context("Failed to update password")?;

        // Stale cookies die with the old password; the caller mints a
        // fresh session for the browser that made the change.
        self.session_repo
            .delete_by_user(user.id)
            .await
            .context("Failed to drop sessions")?;

        self.user_repo
            .get_by_id(user.id)
            .await
            .context("Failed to reload user")?
            .ok_or(UserServiceError::NotFound)
    }

    /// Create a new user (admin operation)
    ///
    /// New accounts always start with the forced-password-change flag set.
    /// The superadmin role cannot be assigned; there is exactly one.
    pub async fn create_user(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let username = input.username.trim().to_string();
        if username.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Username cannot be empty".to_string(),
            ));
        }
        if input.password.is_empty() {
            return Err(UserServiceError::ValidationError(
                "Password cannot be empty".to_string(),
            ));
        }

        let role = input.role.unwrap_or_default();
        if role == UserRole::Superadmin {
            return Err(UserServiceError::ValidationError(
                "The superadmin role cannot be assigned".to_string(),
            ));
        }

        if self
            .user_repo
            .get_by_username(&username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Username '{}' is already taken",
                username
            )));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = User::new(username, password_hash, role);

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to create user")?;

        Ok(created)
    }

    /// Update a user (admin operation)
    ///
    /// Rules enforced here:
    /// - the superadmin account is only editable by itself
    /// - the superadmin is never demoted, not even by itself
    /// - no other account can be promoted to superadmin
    /// - a password reset re-arms the forced-change flag unless the input
    ///   says otherwise
    pub async fn update_user(
        &self,
        actor: &User,
        user_id: i64,
        input: UpdateUserInput,
    ) -> Result<User, UserServiceError> {
        let mut user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or(UserServiceError::NotFound)?;

        if user.is_superadmin() && actor.id != user.id {
            return Err(UserServiceError::Forbidden(
                "The superadmin account can only be edited by itself".to_string(),
            ));
        }

        if let Some(role) = input.role {
            if user.is_superadmin() && role != UserRole::Superadmin {
                return Err(UserServiceError::Forbidden(
                    "The superadmin cannot be demoted".to_string(),
                ));
            }
            if !user.is_superadmin() && role == UserRole::Superadmin {
                return Err(UserServiceError::ValidationError(
                    "The superadmin role cannot be assigned".to_string(),
                ));
            }
            user.role = role;
        }

        if let Some(username) = input.username {
            let username = username.trim().to_string();
            if username.is_empty() {
                return Err(UserServiceError::ValidationError(
                    "Username cannot be empty".to_string(),
                ));
            }
            if username != user.username {
                if self
                    .user_repo
                    .get_by_username(&username)
                    .await
                    .context("Failed to check username")?
                    .is_some()
                {
                    return Err(UserServiceError::UserExists(format!(
                        "Username '{}' is already taken",
                        username
                    )));
                }
                user.username = username;
            }
        }

        if let Some(password) = input.password {
            if !password.is_empty() {
                user.password_hash =
                    hash_password(&password).context("Failed to hash password")?;
                user.must_change_password = input.must_change_password.unwrap_or(true);
            } else if let Some(must_change) = input.must_change_password {
                user.must_change_password = must_change;
            }
        } else if let Some(must_change) = input.must_change_password {
            user.must_change_password = must_change;
        }

        if let Some(profile_image) = input.profile_image {
            user.profile_image = Some(profile_image);
        }

        let updated = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update user")?;

        Ok(updated)
    }

    /// Delete a user (admin operation)
    ///
    /// The superadmin is never deleted, and no one deletes their own
    /// account while logged into it. Sessions and owned vehicles go with
    /// the user via foreign key cascades.
    pub async fn delete_user(&self, actor: &User, user_id: i64) -> Result<(), UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or(UserServiceError::NotFound)?;

        if user.is_superadmin() {
            return Err(UserServiceError::Forbidden(
                "The superadmin account cannot be deleted".to_string(),
            ));
        }
        if actor.id == user.id {
            return Err(UserServiceError::Forbidden(
                "You cannot delete your own account".to_string(),
            ));
        }

        self.user_repo
            .delete(user.id)
            .await
            .context("Failed to delete user")?;

        Ok(())
    }

    /// List all users
    pub async fn list_users(&self) -> Result<Vec<User>, UserServiceError> {
        let users = self
            .user_repo
            .list_all()
            .await
            .context("Failed to list users")?;

        Ok(users)
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;

        Ok(user)
    }

    /// Get user by username
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user by username")?;

        Ok(user)
    }

    /// Ensure the superadmin account exists, seeding it on first start
    ///
    /// The seeded account is admin/admin with the forced-change flag set.
    /// If the username is already taken by a regular account, that account
    /// is promoted instead so the invariant holds.
    pub async fn ensure_superadmin(&self) -> Result<User, UserServiceError> {
        if let Some(existing) = self
            .user_repo
            .find_superadmin()
            .await
            .context("Failed to look up superadmin")?
        {
            return Ok(existing);
        }

        if let Some(mut holder) = self
            .user_repo
            .get_by_username(DEFAULT_SUPERADMIN_USERNAME)
            .await
            .context("Failed to check seed username")?
        {
            tracing::warn!(
                username = DEFAULT_SUPERADMIN_USERNAME,
                "No superadmin found; promoting existing account"
            );
            holder.role = UserRole::Superadmin;
            let promoted = self
                .user_repo
                .update(&holder)
                .await
                .context("Failed to promote superadmin")?;
            return Ok(promoted);
        }

        let password_hash =
            hash_password(DEFAULT_SUPERADMIN_PASSWORD).context("Failed to hash seed password")?;
        let user = User::new(
            DEFAULT_SUPERADMIN_USERNAME.to_string(),
            password_hash,
            UserRole::Superadmin,
        );

        let created = self
            .user_repo
            .create(&user)
            .await
            .context("Failed to seed superadmin")?;

        tracing::info!(username = %created.username, "Seeded superadmin account");
        Ok(created)
    }

    /// Delete all expired sessions
    ///
    /// Maintenance operation, called periodically from the server loop.
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;

        Ok(count)
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================
