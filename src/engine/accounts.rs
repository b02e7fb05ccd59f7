use ulid::Ulid;

use crate::auth::{hash_password, verify_password};
use crate::limits::MAX_USERS;
use crate::model::*;

use super::conflict::required_text;
use super::{Engine, EngineError};

impl Engine {
    /// Register a staff account. The password is stored as an Argon2id hash.
    pub async fn create_user(
        &self,
        id: Ulid,
        username: &str,
        password: &str,
        role: &str,
    ) -> Result<User, EngineError> {
        let username = required_text("username", username)?;
        let role = required_text("role", role)?;
        if password.is_empty() {
            return Err(EngineError::InvalidField("password", "must not be empty"));
        }
        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .ok()
            .and_then(Result::ok)
            .ok_or(EngineError::InvalidField("password", "cannot be hashed"))?;

        // Exclusive so two registrations of one username cannot both pass the check.
        let _gate = self.begin_exclusive().await;
        if self.store.get_user(&username).is_some() {
            return Err(EngineError::DuplicateUsername(username));
        }
        if self.store.user_count() >= MAX_USERS {
            return Err(EngineError::LimitExceeded("too many users"));
        }
        let user = User {
            id,
            username,
            password_hash,
            role,
        };
        self.persist_global(&Event::UserCreated { user: user.clone() })
            .await?;
        tracing::info!("user {} created with role {}", user.username, user.role);
        Ok(user)
    }

    /// Front-desk login. Unknown users and wrong passwords look the same.
    /// Verification runs on the blocking pool.
    pub async fn login(&self, username: &str, password: &str) -> bool {
        let Some(user) = self.store.get_user(username.trim()) else {
            tracing::debug!("login failed for {username:?}");
            return false;
        };
        let password = password.to_string();
        let ok = tokio::task::spawn_blocking(move || verify_password(&password, &user.password_hash))
            .await
            .unwrap_or(false);
        if !ok {
            tracing::debug!("login failed for {username:?}");
        }
        ok
    }

    pub fn user_count(&self) -> usize {
        self.store.user_count()
    }
}
