//! Handle database requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::crypto::random_id;
use crate::error::{Result, ServerError};
use crate::user::{Account, NewUser, ResetCredential, User};

/// Port for account persistence.
///
/// Plain lookups return the public [`User`]; only the `find_account_*`
/// methods expose credentials.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new account and return its public projection.
    async fn insert(&self, user: NewUser) -> Result<User>;

    /// Whether the email or the username is already taken.
    async fn exists(&self, email: &str, username: &str) -> Result<bool>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_account_by_email(&self, email: &str)
    -> Result<Option<Account>>;

    /// Account whose reset credential expires after `now`.
    async fn find_account_with_active_reset(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>>;

    /// Persist password and reset fields.
    async fn save(&self, account: &Account) -> Result<()>;
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: String,
    username: String,
    email: String,
    created_at: DateTime<Utc>,
    password: String,
    password_reset_otp: Option<String>,
    password_reset_expires: Option<DateTime<Utc>>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        let reset = row
            .password_reset_otp
            .zip(row.password_reset_expires)
            .map(|(otp_hash, expires_at)| ResetCredential {
                otp_hash,
                expires_at,
            });

        Account {
            user: User {
                id: row.id,
                username: row.username,
                email: row.email,
                created_at: row.created_at,
            },
            password: row.password,
            reset,
        }
    }
}

const PUBLIC_COLUMNS: &str = "id, username, email, created_at";
const ACCOUNT_COLUMNS: &str = "id, username, email, created_at, password, \
                               password_reset_otp, password_reset_expires";

/// PostgreSQL account store.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: Pool<Postgres>,
}

impl PostgresRepository {
    /// Create a new [`PostgresRepository`].
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresRepository {
    async fn insert(&self, user: NewUser) -> Result<User> {
        let query = format!(
            "INSERT INTO users (id, username, email, password) \
             VALUES ($1, $2, $3, $4) RETURNING {PUBLIC_COLUMNS}"
        );

        sqlx::query_as::<_, User>(&query)
            .bind(random_id())
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| match err.as_database_error() {
                Some(db) if db.is_unique_violation() => {
                    ServerError::AccountExists
                },
                _ => err.into(),
            })
    }

    async fn exists(&self, email: &str, username: &str) -> Result<bool> {
        let (exists,) = sqlx::query_as::<_, (bool,)>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 OR username = $2)",
        )
        .bind(email)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let query = format!("SELECT {PUBLIC_COLUMNS} FROM users WHERE id = $1");

        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query =
            format!("SELECT {PUBLIC_COLUMNS} FROM users WHERE email = $1");

        Ok(sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Account>> {
        let query =
            format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1");

        let row = sqlx::query_as::<_, AccountRow>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Account::from))
    }

    async fn find_account_with_active_reset(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users \
             WHERE email = $1 AND password_reset_expires > $2"
        );

        let row = sqlx::query_as::<_, AccountRow>(&query)
            .bind(email)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Account::from))
    }

    async fn save(&self, account: &Account) -> Result<()> {
        let (otp, expires) = match &account.reset {
            Some(reset) => (Some(reset.otp_hash.as_str()), Some(reset.expires_at)),
            None => (None, None),
        };

        sqlx::query(
            r#"UPDATE users
                SET password = $1, password_reset_otp = $2, password_reset_expires = $3
                WHERE id = $4"#,
        )
        .bind(&account.password)
        .bind(otp)
        .bind(expires)
        .bind(&account.user.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
