//! Cryptographic logics.

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::Rng;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::config::Argon2 as ArgonConfig;

const OTP_MIN: u32 = 100_000;
const OTP_MAX: u32 = 999_999;
const ID_BYTES: usize = 12;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
}

/// Password manager that uses Argon2id and PHC string format for hashing and
/// verification.
///
/// Hashes both account passwords and reset codes.
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash password using Argon2id.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify password against a PHC string.
    ///
    /// The digest comparison inside `argon2` is constant-time.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        phc_hash: &str,
    ) -> bool {
        let Ok(parsed) = PasswordHash::new(phc_hash) else {
            return false;
        };

        self.argon2()
            .verify_password(password.as_ref(), &parsed)
            .is_ok()
    }
}

/// Six-digit one-time password.
#[derive(Clone, PartialEq, Eq)]
pub struct Otp(String);

impl Otp {
    /// Draw a code uniformly from `100000..=999999`.
    pub fn generate() -> Self {
        Self(OsRng.gen_range(OTP_MIN..=OTP_MAX).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Never print the code itself.
impl std::fmt::Debug for Otp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Otp(******)")
    }
}

/// Random 24 hex characters account identifier.
pub fn random_id() -> String {
    let mut bytes = [0u8; ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PasswordManager {
        PasswordManager::new(Some(ArgonConfig {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }))
        .unwrap()
    }

    #[test]
    fn test_argon2() {
        let pwd = manager();
        let hash = pwd.hash_password("P$soW%920$n&").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(pwd.verify_password("P$soW%920$n&", &hash));
        assert!(!pwd.verify_password("P$soW%920$n", &hash));
        assert!(!pwd.verify_password("P$soW%920$n&", "not a phc string"));
    }

    #[test]
    fn test_otp_format() {
        for _ in 0..1_000 {
            let otp = Otp::generate();
            assert_eq!(otp.as_str().len(), 6);
            let value: u32 = otp.as_str().parse().unwrap();
            assert!((OTP_MIN..=OTP_MAX).contains(&value));
        }
    }

    #[test]
    fn test_otp_is_not_printed() {
        let otp = Otp::generate();
        assert!(!format!("{otp:?}").contains(otp.as_str()));
    }

    #[test]
    fn test_random_id() {
        let id = random_id();
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, random_id());
    }
}
