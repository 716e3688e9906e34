//! Domain service for credentials and sessions.
//!
//! Handles login, registration, password changes and the forgot/reset
//! password flow. Everything it hands back is a [`Principal`]: the user as
//! exposed to the rest of the system, with the password hash and reset-token
//! fields already stripped.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::db::{CreateUserError, User};

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Deliberately identical for an unknown username and a wrong password,
    /// so login failures never reveal which usernames exist.
    #[error("Username or password incorrect")]
    InvalidCredentials,

    #[error("User not found")]
    UserNotFound,

    #[error("Username already in use")]
    UsernameTaken,

    #[error("Email already in use")]
    EmailTaken,

    #[error("{0}")]
    Validation(String),

    #[error("Invalid or expired token")]
    InvalidResetToken,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<CreateUserError> for AuthError {
    fn from(err: CreateUserError) -> Self {
        match err {
            CreateUserError::UsernameTaken => Self::UsernameTaken,
            CreateUserError::EmailTaken => Self::EmailTaken,
            CreateUserError::Db(db) => Self::Database(db.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Moderator,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Moderator => "moderator",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Self::Member),
            "moderator" => Ok(Self::Moderator),
            "admin" => Ok(Self::Admin),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

/// The authenticated user as exposed to handlers and serialized to clients.
/// Never carries the password hash or reset-token fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub avatar: Option<String>,
    pub created_at: String,
}

impl From<User> for Principal {
    fn from(user: User) -> Self {
        // An unrecognized stored role degrades to member rather than
        // granting anything.
        let role = user.role.parse().unwrap_or(Role::Member);
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            name: user.name,
            role,
            avatar: user.avatar,
            created_at: user.created_at,
        }
    }
}

/// Validated registration data. Shape validation (lengths, email format,
/// password confirmation) happens at the endpoint boundary before this is
/// built.
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub name: String,
    pub password: String,
}

/// Outcome of starting a password reset: who it is for and the opaque token
/// to embed in the mailed link.
#[derive(Debug, Clone)]
pub struct PasswordReset {
    pub user: Principal,
    pub token: String,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Verifies credentials and returns the stripped principal.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for an unknown username and
    /// for a wrong password alike.
    async fn login(&self, username: &str, password: &str) -> Result<Principal, AuthError>;

    /// Creates a new account with the default member role.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UsernameTaken`] or [`AuthError::EmailTaken`] on
    /// duplicates, enforced at the store's write path.
    async fn register(&self, registration: Registration) -> Result<Principal, AuthError>;

    /// Resolves a session-stored id back into a principal. A missing user is
    /// `Ok(None)`, not an error: a session may outlive its account.
    async fn principal_by_id(&self, id: i32) -> Result<Option<Principal>, AuthError>;

    /// Changes a user's password after verifying the current one.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] if the current password is wrong;
    /// the caller is authenticated, so this is not an authentication failure.
    async fn change_password(
        &self,
        user_id: i32,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;

    /// Issues a time-limited reset token for the account behind `email`.
    async fn start_password_reset(&self, email: &str) -> Result<PasswordReset, AuthError>;

    /// Redeems a reset token exactly once, setting the new password.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidResetToken`] for unknown, expired or
    /// already-used tokens.
    async fn complete_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;
}
