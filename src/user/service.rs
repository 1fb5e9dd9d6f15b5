use std::sync::Arc;

use crate::crypto::PasswordManager;
use crate::error::{Result, ServerError};
use crate::user::{NewUser, User, UserRepository};

/// Emails are compared case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Account manager.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    crypto: Arc<PasswordManager>,
}

impl UserService {
    /// Create a new [`UserService`].
    pub fn new(repo: Arc<dyn UserRepository>, crypto: Arc<PasswordManager>) -> Self {
        Self { repo, crypto }
    }

    /// Create an account with a hashed password.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User> {
        let email = normalize_email(email);
        if self.repo.exists(&email, username).await? {
            return Err(ServerError::AccountExists);
        }

        let user = self
            .repo
            .insert(NewUser {
                username: username.to_owned(),
                email,
                password: self.crypto.hash_password(password)?,
            })
            .await?;

        tracing::info!(user_id = user.id, "account created");
        Ok(user)
    }

    /// Check credentials.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let account = self
            .repo
            .find_account_by_email(&normalize_email(email))
            .await?
            .ok_or(ServerError::InvalidCredentials)?;

        if !self.crypto.verify_password(password, &account.password) {
            tracing::debug!(user_id = account.user.id, "wrong password");
            return Err(ServerError::InvalidCredentials);
        }

        Ok(account.user)
    }

    /// Find a user by identifier.
    pub async fn find_by_id(&self, id: &str) -> Result<User> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(ServerError::UserNotFound)
    }
}
