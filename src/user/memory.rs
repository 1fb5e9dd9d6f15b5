//! Process-local account store, used when no database is configured.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::crypto::random_id;
use crate::error::{Result, ServerError};
use crate::user::{Account, NewUser, User, UserRepository};

#[derive(Default)]
pub struct MemoryRepository {
    accounts: RwLock<HashMap<String, Account>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Account>>> {
        self.accounts.read().map_err(|_| poisoned())
    }

    fn find(&self, predicate: impl Fn(&Account) -> bool) -> Result<Option<Account>> {
        Ok(self.read()?.values().find(|a| predicate(a)).cloned())
    }
}

fn poisoned() -> ServerError {
    ServerError::Internal {
        details: "account store lock poisoned".into(),
        source: None,
    }
}

#[async_trait]
impl UserRepository for MemoryRepository {
    async fn insert(&self, user: NewUser) -> Result<User> {
        let mut accounts = self.accounts.write().map_err(|_| poisoned())?;
        if accounts
            .values()
            .any(|a| a.user.email == user.email || a.user.username == user.username)
        {
            return Err(ServerError::AccountExists);
        }

        let public = User {
            id: random_id(),
            username: user.username,
            email: user.email,
            created_at: Utc::now(),
        };
        accounts.insert(
            public.id.clone(),
            Account {
                user: public.clone(),
                password: user.password,
                reset: None,
            },
        );

        Ok(public)
    }

    async fn exists(&self, email: &str, username: &str) -> Result<bool> {
        Ok(self
            .find(|a| a.user.email == email || a.user.username == username)?
            .is_some())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.read()?.get(id).map(|a| a.user.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.find(|a| a.user.email == email)?.map(|a| a.user))
    }

    async fn find_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Account>> {
        self.find(|a| a.user.email == email)
    }

    async fn find_account_with_active_reset(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        self.find(|a| {
            a.user.email == email
                && a.reset.as_ref().is_some_and(|r| r.is_active(now))
        })
    }

    async fn save(&self, account: &Account) -> Result<()> {
        let mut accounts = self.accounts.write().map_err(|_| poisoned())?;
        match accounts.get_mut(&account.user.id) {
            Some(stored) => {
                stored.password = account.password.clone();
                stored.reset = account.reset.clone();
                Ok(())
            },
            None => Err(ServerError::UserNotFound),
        }
    }
}
