//! Password reset with an emailed one-time password.
//!
//! An account moves through `no active reset -> code issued -> consumed or
//! expired`. Only the argon2id hash of the code is stored, next to an
//! absolute expiry. Issuing a new code replaces the previous one.

use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;
use crate::config::Reset;
use crate::crypto::{Otp, PasswordManager};
use crate::error::{Result, ServerError};
use crate::mail::{Mailer, Message};
use crate::user::{ResetCredential, User, UserRepository, normalize_email};

/// Reset code issuer and verifier.
#[derive(Clone)]
pub struct PasswordReset {
    repo: Arc<dyn UserRepository>,
    crypto: Arc<PasswordManager>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    config: Reset,
}

impl PasswordReset {
    pub fn new(
        repo: Arc<dyn UserRepository>,
        crypto: Arc<PasswordManager>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        config: Reset,
    ) -> Self {
        Self {
            repo,
            crypto,
            mailer,
            clock,
            config,
        }
    }

    /// Issue a code and email it.
    ///
    /// If the email cannot be sent, the stored credential is cleared again.
    pub async fn issue(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        let Some(mut account) = self.repo.find_account_by_email(&email).await?
        else {
            if self.config.conceal_unknown_accounts {
                tracing::debug!("reset requested for unknown account");
                return Ok(());
            }
            return Err(ServerError::UserNotFound);
        };

        let otp = Otp::generate();
        account.reset = Some(ResetCredential {
            otp_hash: self.crypto.hash_password(otp.as_str())?,
            expires_at: self.clock.now() + Duration::seconds(self.config.otp_ttl),
        });
        self.repo.save(&account).await?;

        let message = Message::password_reset(
            &account.user.email,
            &account.user.username,
            otp.as_str(),
            self.config.otp_ttl / 60,
        );

        if let Err(err) = self.mailer.send(&message).await {
            account.reset = None;
            if let Err(rollback) = self.repo.save(&account).await {
                tracing::error!(
                    user_id = account.user.id,
                    error = %rollback,
                    "cannot clear reset credential"
                );
            }
            return Err(ServerError::EmailDelivery(Box::new(err)));
        }

        tracing::info!(user_id = account.user.id, "reset code issued");
        Ok(())
    }

    /// Check a code and set a new password.
    ///
    /// A wrong code leaves the credential untouched so the user can retry
    /// until it expires.
    pub async fn consume(
        &self,
        email: &str,
        otp: &str,
        password: &str,
    ) -> Result<User> {
        let mut account = self
            .repo
            .find_account_with_active_reset(
                &normalize_email(email),
                self.clock.now(),
            )
            .await?
            .ok_or(ServerError::ResetInvalidOrExpired)?;

        let matches = account
            .reset
            .as_ref()
            .is_some_and(|reset| {
                self.crypto.verify_password(otp.trim(), &reset.otp_hash)
            });
        if !matches {
            tracing::debug!(user_id = account.user.id, "wrong reset code");
            return Err(ServerError::InvalidOtp);
        }

        account.password = self.crypto.hash_password(password)?;
        account.reset = None;
        self.repo.save(&account).await?;

        tracing::info!(user_id = account.user.id, "password reset");
        Ok(account.user)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::clock::FixedClock;
    use crate::config::Argon2;
    use crate::mail::MemoryMailer;
    use crate::user::{Account, MemoryRepository, NewUser};

    const EMAIL: &str = "ada@example.com";

    struct Harness {
        reset: PasswordReset,
        repo: Arc<MemoryRepository>,
        mailer: Arc<MemoryMailer>,
        clock: Arc<FixedClock>,
        crypto: Arc<PasswordManager>,
    }

    impl Harness {
        async fn new(mailer: MemoryMailer, config: Reset) -> Self {
            let crypto = Arc::new(
                PasswordManager::new(Some(Argon2 {
                    memory_cost: 1024,
                    iterations: 1,
                    parallelism: 1,
                    hash_length: 32,
                }))
                .unwrap(),
            );
            let repo = Arc::new(MemoryRepository::new());
            let mailer = Arc::new(mailer);
            let clock = Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            ));

            repo.insert(NewUser {
                username: "ada".into(),
                email: EMAIL.into(),
                password: crypto.hash_password("old password").unwrap(),
            })
            .await
            .unwrap();

            let reset = PasswordReset::new(
                repo.clone(),
                crypto.clone(),
                mailer.clone(),
                clock.clone(),
                config,
            );

            Self {
                reset,
                repo,
                mailer,
                clock,
                crypto,
            }
        }

        async fn account(&self) -> Account {
            self.repo
                .find_account_by_email(EMAIL)
                .await
                .unwrap()
                .unwrap()
        }

        fn code(&self) -> String {
            let html = self.mailer.last().unwrap().html;
            let start = html.find("<strong>").unwrap() + "<strong>".len();
            html[start..start + 6].to_owned()
        }
    }

    #[tokio::test]
    async fn test_issue_stores_hash_only() {
        let h = Harness::new(MemoryMailer::default(), Reset::default()).await;
        h.reset.issue(EMAIL).await.unwrap();

        let code = h.code();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));

        let message = h.mailer.last().unwrap();
        assert_eq!(message.to, EMAIL);
        assert_eq!(message.subject, "Password Reset OTP");

        let reset = h.account().await.reset.unwrap();
        assert_ne!(reset.otp_hash, code);
        assert!(!reset.otp_hash.contains(&code));
        assert!(h.crypto.verify_password(&code, &reset.otp_hash));
        assert_eq!(reset.expires_at, h.clock.now() + Duration::seconds(600));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let h = Harness::new(MemoryMailer::default(), Reset::default()).await;
        assert!(matches!(
            h.reset.issue("nobody@example.com").await,
            Err(ServerError::UserNotFound)
        ));

        let concealed = Harness::new(
            MemoryMailer::default(),
            Reset {
                conceal_unknown_accounts: true,
                ..Default::default()
            },
        )
        .await;
        concealed.reset.issue("nobody@example.com").await.unwrap();
        assert!(concealed.mailer.last().is_none());
    }

    #[tokio::test]
    async fn test_mail_failure_rolls_back() {
        let h = Harness::new(MemoryMailer::failing(), Reset::default()).await;

        assert!(matches!(
            h.reset.issue(EMAIL).await,
            Err(ServerError::EmailDelivery(_))
        ));
        assert_eq!(h.account().await.reset, None);
    }

    #[tokio::test]
    async fn test_reissue_replaces_code() {
        let h = Harness::new(MemoryMailer::default(), Reset::default()).await;
        h.reset.issue(EMAIL).await.unwrap();
        let first = h.account().await.reset.unwrap();

        h.clock.advance(Duration::seconds(30));
        h.reset.issue(EMAIL).await.unwrap();
        let second = h.account().await.reset.unwrap();

        assert_ne!(first.otp_hash, second.otp_hash);
        assert_eq!(second.expires_at, first.expires_at + Duration::seconds(30));
        assert_eq!(h.mailer.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_wrong_code_keeps_credential() {
        let h = Harness::new(MemoryMailer::default(), Reset::default()).await;
        h.reset.issue(EMAIL).await.unwrap();
        let before = h.account().await;

        let wrong = if h.code() == "123456" { "654321" } else { "123456" };
        assert!(matches!(
            h.reset.consume(EMAIL, wrong, "new password").await,
            Err(ServerError::InvalidOtp)
        ));
        assert_eq!(h.account().await, before);
    }

    #[tokio::test]
    async fn test_expired_code() {
        let h = Harness::new(MemoryMailer::default(), Reset::default()).await;
        h.reset.issue(EMAIL).await.unwrap();
        let code = h.code();
        let before = h.account().await;

        h.clock.advance(Duration::seconds(600));
        assert!(matches!(
            h.reset.consume(EMAIL, &code, "new password").await,
            Err(ServerError::ResetInvalidOrExpired)
        ));
        assert_eq!(h.account().await, before);
    }

    #[tokio::test]
    async fn test_consume() {
        let h = Harness::new(MemoryMailer::default(), Reset::default()).await;
        h.reset.issue(EMAIL).await.unwrap();
        let code = h.code();

        h.clock.advance(Duration::seconds(599));
        let user = h
            .reset
            .consume("ADA@example.com", &code, "new password")
            .await
            .unwrap();
        assert_eq!(user.email, EMAIL);

        let account = h.account().await;
        assert_eq!(account.reset, None);
        assert!(h.crypto.verify_password("new password", &account.password));
        assert!(!h.crypto.verify_password("old password", &account.password));

        // Single use.
        assert!(matches!(
            h.reset.consume(EMAIL, &code, "another one").await,
            Err(ServerError::ResetInvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn test_no_reset_requested() {
        let h = Harness::new(MemoryMailer::default(), Reset::default()).await;
        assert!(matches!(
            h.reset.consume(EMAIL, "123456", "new password").await,
            Err(ServerError::ResetInvalidOrExpired)
        ));
    }
}
