//! User model
//!
//! Defines the User entity and the three-tier role system. The superadmin is
//! a singleton account seeded at first start; it can never be deleted or
//! demoted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User entity representing an account in the system.
///
/// Members own vehicles; admins additionally see every vehicle and manage
/// accounts; the superadmin is an admin that cannot be removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique)
    pub username: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// User role
    pub role: UserRole,
    /// Whether the user must set a new password before using the app
    pub must_change_password: bool,
    /// Stored filename of the profile image, if any
    pub profile_image: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User with the given parameters.
    ///
    /// Note: The password should already be hashed before calling this
    /// function. Use `services::password::hash_password()` to hash it.
    /// New accounts start with the forced password change flag set.
    pub fn new(username: String, password_hash: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            username,
            password_hash,
            role,
            must_change_password: true,
            profile_image: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the user has administrative privileges
    pub fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Superadmin)
    }

    /// Check if the user is the superadmin
    pub fn is_superadmin(&self) -> bool {
        self.role == UserRole::Superadmin
    }

    /// Check if the user may view or modify a vehicle owned by `owner_id`.
    ///
    /// Admins reach every vehicle; members only their own.
    pub fn can_access_vehicle(&self, owner_id: i64) -> bool {
        self.is_admin() || self.id == owner_id
    }
}

/// User role for authorization.
///
/// - Member: owns vehicles, sees only their own data
/// - Admin: sees and manages all vehicles and users
/// - Superadmin: admin plus unremovable; exactly one exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Regular vehicle owner
    Member,
    /// Administrator
    Admin,
    /// Non-removable top-level account
    Superadmin,
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Member
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Member => write!(f, "member"),
            UserRole::Admin => write!(f, "admin"),
            UserRole::Superadmin => write!(f, "superadmin"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "member" => Ok(UserRole::Member),
            "admin" => Ok(UserRole::Admin),
            "superadmin" => Ok(UserRole::Superadmin),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Input for creating a new user (before password hashing)
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    /// Username
    pub username: String,
    /// Plaintext password (will be hashed)
    pub password: String,
    /// User role (optional, defaults to Member)
    pub role: Option<UserRole>,
}

/// Input for updating a user
#[derive(Debug, Clone, Default)]
pub struct UpdateUserInput {
    /// New username (optional)
    pub username: Option<String>,
    /// New password (optional, will be hashed)
    pub password: Option<String>,
    /// New role (optional)
    pub role: Option<UserRole>,
    /// New forced-change flag (optional)
    pub must_change_password: Option<bool>,
    /// New profile image filename (optional)
    pub profile_image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_new() {
        let user = User::new(
            "testuser".to_string(),
            "hashed_password".to_string(),
            UserRole::Member,
        );

        assert_eq!(user.id, 0);
        assert_eq!(user.username, "testuser");
        assert_eq!(user.role, UserRole::Member);
        assert!(user.must_change_password);
        assert!(user.profile_image.is_none());
    }

    #[test]
    fn test_user_is_admin() {
        let superadmin = User::new("root".into(), "hash".into(), UserRole::Superadmin);
        let admin = User::new("admin".into(), "hash".into(), UserRole::Admin);
        let member = User::new("member".into(), "hash".into(), UserRole::Member);

        assert!(superadmin.is_admin());
        assert!(admin.is_admin());
        assert!(!member.is_admin());

        assert!(superadmin.is_superadmin());
        assert!(!admin.is_superadmin());
        assert!(!member.is_superadmin());
    }

    #[test]
    fn test_user_can_access_vehicle() {
        let mut admin = User::new("admin".into(), "hash".into(), UserRole::Admin);
        admin.id = 1;

        let mut member = User::new("member".into(), "hash".into(), UserRole::Member);
        member.id = 2;

        // Admin reaches anyone's vehicle
        assert!(admin.can_access_vehicle(1));
        assert!(admin.can_access_vehicle(2));
        assert!(admin.can_access_vehicle(999));

        // Member only their own
        assert!(member.can_access_vehicle(2));
        assert!(!member.can_access_vehicle(1));
        assert!(!member.can_access_vehicle(999));
    }

    #[test]
    fn test_user_role_display() {
        assert_eq!(UserRole::Member.to_string(), "member");
        assert_eq!(UserRole::Admin.to_string(), "admin");
        assert_eq!(UserRole::Superadmin.to_string(), "superadmin");
    }

    #[test]
    fn test_user_role_from_str() {
        assert_eq!(UserRole::from_str("member").unwrap(), UserRole::Member);
        assert_eq!(UserRole::from_str("ADMIN").unwrap(), UserRole::Admin);
        assert_eq!(
            UserRole::from_str("Superadmin").unwrap(),
            UserRole::Superadmin
        );
        assert!(UserRole::from_str("invalid").is_err());
    }

    #[test]
    fn test_user_role_default() {
        assert_eq!(UserRole::default(), UserRole::Member);
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = User::new("u".into(), "secret-hash".into(), UserRole::Member);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
    }
}
