use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, NotSet, QueryFilter, QueryOrder,
    Set, SqlErr,
};
use thiserror::Error;

use crate::config::SecurityConfig;
use crate::entities::users;

/// User data returned from the repository (without the password hash or
/// reset-token fields).
#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub avatar: Option<String>,
    pub created_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            name: model.name,
            role: model.role,
            avatar: model.avatar,
            created_at: model.created_at,
        }
    }
}

/// Fields required to create a user. The password arrives already hashed;
/// plaintext never reaches the repository.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: String,
}

/// Explicit patch for the mutable profile fields. `id`, `created_at` and the
/// password hash cannot be set through this path.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub role: Option<String>,
    pub avatar: Option<String>,
}

impl UserPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.role.is_none() && self.avatar.is_none()
    }
}

#[derive(Debug, Error)]
pub enum CreateUserError {
    #[error("Username already in use")]
    UsernameTaken,

    #[error("Email already in use")]
    EmailTaken,

    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    /// Get user by username (case-insensitive)
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.find_by_username(username).await?.map(User::from))
    }

    /// Get user by email (case-insensitive)
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(users::Column::Email)))
                    .eq(email.to_lowercase()),
            )
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user.map(User::from))
    }

    /// Get user by username with password hash (for credential verification)
    pub async fn get_by_username_with_password(
        &self,
        username: &str,
    ) -> Result<Option<(User, String)>> {
        Ok(self.find_by_username(username).await?.map(|u| {
            let password_hash = u.password_hash.clone();
            (User::from(u), password_hash)
        }))
    }

    /// Get user by ID with password hash (for password changes)
    pub async fn get_by_id_with_password(&self, id: i32) -> Result<Option<(User, String)>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(|u| {
            let password_hash = u.password_hash.clone();
            (User::from(u), password_hash)
        }))
    }

    /// List all users, oldest first
    pub async fn list_all(&self) -> Result<Vec<User>> {
        let models = users::Entity::find()
            .order_by_asc(users::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        Ok(models.into_iter().map(User::from).collect())
    }

    /// Create a user. Uniqueness of username and email is enforced here, at
    /// the write path: a case-insensitive pre-check catches same-name
    /// variants, and the unique constraints on both columns are the atomic
    /// backstop for concurrent registrations.
    pub async fn create(&self, new_user: NewUser) -> Result<User, CreateUserError> {
        if self.find_by_username(&new_user.username).await?.is_some() {
            return Err(CreateUserError::UsernameTaken);
        }

        let email_taken = users::Entity::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(users::Column::Email)))
                    .eq(new_user.email.to_lowercase()),
            )
            .one(&self.conn)
            .await?
            .is_some();
        if email_taken {
            return Err(CreateUserError::EmailTaken);
        }

        let now = chrono::Utc::now().to_rfc3339();

        let active = users::ActiveModel {
            id: NotSet,
            username: Set(new_user.username),
            email: Set(new_user.email),
            password_hash: Set(new_user.password_hash),
            name: Set(new_user.name),
            role: Set(new_user.role),
            avatar: Set(None),
            reset_token: Set(None),
            reset_token_expiry: Set(None),
            created_at: Set(now),
        };

        let model = active.insert(&self.conn).await.map_err(|err| {
            // Two registrations racing past the pre-check land here.
            if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
                if detail.contains("email") {
                    return CreateUserError::EmailTaken;
                }
                return CreateUserError::UsernameTaken;
            }
            CreateUserError::Db(err)
        })?;

        Ok(User::from(model))
    }

    /// Apply a profile patch. Returns `None` if the user does not exist.
    pub async fn update(&self, id: i32, patch: UserPatch) -> Result<Option<User>> {
        let Some(user) = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for update")?
        else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        if let Some(name) = patch.name {
            active.name = Set(name);
        }
        if let Some(role) = patch.role {
            active.role = Set(role);
        }
        if let Some(avatar) = patch.avatar {
            active.avatar = Set(Some(avatar));
        }

        let model = active
            .update(&self.conn)
            .await
            .context("Failed to update user")?;

        Ok(Some(model.into()))
    }

    /// Replace the stored password hash. Returns false if the user is gone.
    pub async fn update_password_hash(&self, id: i32, new_hash: &str) -> Result<bool> {
        let Some(user) = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for password update")?
        else {
            return Ok(false);
        };

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(new_hash.to_string());
        active.update(&self.conn).await?;

        Ok(true)
    }

    /// Store a pending reset token on the user record, replacing any
    /// previous one.
    pub async fn set_reset_token(&self, id: i32, token: &str, expiry: &str) -> Result<bool> {
        let Some(user) = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for reset token")?
        else {
            return Ok(false);
        };

        let mut active: users::ActiveModel = user.into();
        active.reset_token = Set(Some(token.to_string()));
        active.reset_token_expiry = Set(Some(expiry.to_string()));
        active.update(&self.conn).await?;

        Ok(true)
    }

    /// Redeem a reset token: look it up by column equality, check the expiry
    /// is still in the future, then store the new hash and clear the token
    /// fields so a second redemption fails. Returns `None` for an unknown,
    /// expired or already-used token.
    pub async fn consume_reset_token(&self, token: &str, new_hash: &str) -> Result<Option<User>> {
        let Some(user) = users::Entity::find()
            .filter(users::Column::ResetToken.eq(token))
            .one(&self.conn)
            .await
            .context("Failed to query user by reset token")?
        else {
            return Ok(None);
        };

        // An expired-but-still-present token is equivalent to no token.
        let still_valid = user
            .reset_token_expiry
            .as_deref()
            .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
            .is_some_and(|expiry| expiry > chrono::Utc::now());

        if !still_valid {
            return Ok(None);
        }

        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(new_hash.to_string());
        active.reset_token = Set(None);
        active.reset_token_expiry = Set(None);

        let model = active
            .update(&self.conn)
            .await
            .context("Failed to redeem reset token")?;

        Ok(Some(model.into()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<users::Model>, sea_orm::DbErr> {
        users::Entity::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(users::Column::Username)))
                    .eq(username.to_lowercase()),
            )
            .one(&self.conn)
            .await
    }
}

/// Hash a password using Argon2id with optional custom params.
/// If config is None, uses default params.
pub fn hash_password(password: &str, config: Option<&SecurityConfig>) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let argon2 = if let Some(cfg) = config {
        let params = Params::new(
            cfg.argon2_memory_cost_kib,
            cfg.argon2_time_cost,
            cfg.argon2_parallelism,
            None, // output length (use default)
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    } else {
        Argon2::default()
    };

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Verify a plaintext attempt against a stored digest. A malformed digest
/// verifies as false rather than erroring, so callers can treat every
/// non-match the same way.
#[must_use]
pub fn verify_password(password: &str, digest: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(digest) else {
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate an opaque reset token (64 character hex string)
#[must_use]
pub fn generate_reset_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        use std::fmt::Write;
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
