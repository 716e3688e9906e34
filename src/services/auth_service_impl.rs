//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::task;

use crate::config::SecurityConfig;
use crate::db::{NewUser, Store};
use crate::db::repositories::user::{generate_reset_token, hash_password, verify_password};
use crate::services::auth_service::{
    AuthError, AuthService, PasswordReset, Principal, Registration, Role,
};

pub struct SeaOrmAuthService {
    store: Store,
    security: SecurityConfig,
}

impl SeaOrmAuthService {
    #[must_use]
    pub const fn new(store: Store, security: SecurityConfig) -> Self {
        Self { store, security }
    }

    /// Argon2 is CPU-intensive by design; run it off the async runtime.
    async fn hash_blocking(&self, password: &str) -> Result<String, AuthError> {
        let password = password.to_string();
        let security = self.security.clone();

        task::spawn_blocking(move || hash_password(&password, Some(&security)))
            .await
            .map_err(|e| AuthError::Internal(format!("Password hashing task panicked: {e}")))?
            .map_err(AuthError::from)
    }

    async fn verify_blocking(password: &str, digest: &str) -> Result<bool, AuthError> {
        let password = password.to_string();
        let digest = digest.to_string();

        task::spawn_blocking(move || verify_password(&password, &digest))
            .await
            .map_err(|e| AuthError::Internal(format!("Password verification task panicked: {e}")))
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn login(&self, username: &str, password: &str) -> Result<Principal, AuthError> {
        let Some((user, digest)) = self
            .store
            .get_user_by_username_with_password(username)
            .await?
        else {
            return Err(AuthError::InvalidCredentials);
        };

        if !Self::verify_blocking(password, &digest).await? {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(Principal::from(user))
    }

    async fn register(&self, registration: Registration) -> Result<Principal, AuthError> {
        let password_hash = self.hash_blocking(&registration.password).await?;

        let user = self
            .store
            .create_user(NewUser {
                username: registration.username,
                email: registration.email,
                name: registration.name,
                password_hash,
                role: Role::Member.as_str().to_string(),
            })
            .await?;

        tracing::info!(user_id = user.id, "New account registered: {}", user.username);

        Ok(Principal::from(user))
    }

    async fn principal_by_id(&self, id: i32) -> Result<Option<Principal>, AuthError> {
        let user = self.store.get_user(id).await?;
        Ok(user.map(Principal::from))
    }

    async fn change_password(
        &self,
        user_id: i32,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let Some((user, digest)) = self.store.get_user_with_password(user_id).await? else {
            return Err(AuthError::UserNotFound);
        };

        if !Self::verify_blocking(current_password, &digest).await? {
            return Err(AuthError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }

        let new_hash = self.hash_blocking(new_password).await?;
        if !self.store.update_user_password_hash(user.id, &new_hash).await? {
            return Err(AuthError::UserNotFound);
        }

        tracing::info!(user_id = user.id, "Password changed for user: {}", user.username);

        Ok(())
    }

    async fn start_password_reset(&self, email: &str) -> Result<PasswordReset, AuthError> {
        let Some(user) = self.store.get_user_by_email(email).await? else {
            return Err(AuthError::UserNotFound);
        };

        let token = generate_reset_token();
        let expiry =
            (Utc::now() + Duration::minutes(self.security.reset_token_ttl_minutes)).to_rfc3339();

        if !self.store.set_reset_token(user.id, &token, &expiry).await? {
            return Err(AuthError::UserNotFound);
        }

        tracing::info!(user_id = user.id, "Password reset requested");

        Ok(PasswordReset {
            user: Principal::from(user),
            token,
        })
    }

    async fn complete_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let new_hash = self.hash_blocking(new_password).await?;

        let Some(user) = self.store.consume_reset_token(token, &new_hash).await? else {
            return Err(AuthError::InvalidResetToken);
        };

        tracing::info!(user_id = user.id, "Password reset completed");

        Ok(())
    }
}
