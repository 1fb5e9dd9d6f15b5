mod memory;
mod repository;
mod service;

pub use memory::*;
pub use repository::*;
pub use service::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public projection of an account.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow,
)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Pending password reset: hashed code and absolute expiry.
#[derive(Clone, Debug, PartialEq)]
pub struct ResetCredential {
    pub otp_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl ResetCredential {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Privileged projection of an account, with credentials.
///
/// Only the authentication and reset flows read it.
#[derive(Clone, Debug, PartialEq)]
pub struct Account {
    pub user: User,
    pub password: String,
    pub reset: Option<ResetCredential>,
}

/// Account to insert.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    /// Argon2id PHC string.
    pub password: String,
}
