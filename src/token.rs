//! Manage json web tokens.

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use crate::config::Token;
use crate::error::{Result, ServerError};

const DEFAULT_AUDIENCE: &str = "transformer-designer";
/// Default token lifetime, in seconds.
pub const EXPIRATION_TIME: u64 = 60 * 60 * 24; // 1 day.

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Claims {
    /// Recipients that the JWT is intended for.
    pub aud: String,
    /// Identifies the expiration time on or after which the JWT must not be
    /// accepted for processing.
    pub exp: u64,
    /// Identifies the time at which the JWT was issued.
    pub iat: u64,
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// User ID.
    pub sub: String,
}

/// Manage JWT tokens.
#[derive(Clone)]
pub struct TokenManager {
    algorithm: Algorithm,
    public_key: DecodingKey,
    private_key: EncodingKey,
    name: String,
    audience: String,
    expires_in: u64,
}

impl TokenManager {
    /// Create a new HS256 [`TokenManager`] from a shared secret.
    pub fn from_secret(name: &str, secret: &str) -> Self {
        Self {
            algorithm: Algorithm::HS256,
            public_key: DecodingKey::from_secret(secret.as_bytes()),
            private_key: EncodingKey::from_secret(secret.as_bytes()),
            name: name.to_owned(),
            audience: DEFAULT_AUDIENCE.to_owned(),
            expires_in: EXPIRATION_TIME,
        }
    }

    /// Create a new ES384 [`TokenManager`] from PEM keys.
    pub fn from_ec_pem(
        name: &str,
        public_key_pem: &str,
        private_key_pem: &str,
    ) -> Result<Self> {
        Ok(Self {
            algorithm: Algorithm::ES384,
            public_key: DecodingKey::from_ec_pem(public_key_pem.as_bytes())?,
            private_key: EncodingKey::from_ec_pem(private_key_pem.as_bytes())?,
            name: name.to_owned(),
            audience: DEFAULT_AUDIENCE.to_owned(),
            expires_in: EXPIRATION_TIME,
        })
    }

    /// Build from the `token` configuration entry.
    pub fn from_config(name: &str, config: &Token) -> Result<Self> {
        let mut manager = match (
            &config.secret,
            &config.public_key_pem,
            &config.private_key_pem,
        ) {
            (Some(secret), _, _) => Self::from_secret(name, secret),
            (None, Some(public), Some(private)) => {
                Self::from_ec_pem(name, public, private)?
            },
            _ => {
                return Err(ServerError::Internal {
                    details: "`token` needs `secret` or both PEM keys".into(),
                    source: None,
                });
            },
        };

        if let Some(audience) = &config.audience {
            manager.audience(audience);
        }
        if let Some(expires_in) = config.expires_in {
            manager.expires_in = expires_in;
        }

        Ok(manager)
    }

    /// Set `audience` field on JWT.
    pub fn audience(&mut self, audience: &str) {
        self.audience = audience.to_owned();
    }

    /// Token lifetime in seconds.
    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    /// Create a new [`jsonwebtoken`].
    pub fn create(&self, user_id: &str) -> Result<String> {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| ServerError::Internal {
                details: "system time before Unix epoch".into(),
                source: Some(Box::new(err)),
            })?
            .as_secs();
        let header = Header::new(self.algorithm);
        let claims = Claims {
            aud: self.audience.clone(),
            exp: time + self.expires_in,
            iat: time,
            iss: self.name.clone(),
            sub: user_id.to_owned(),
        };

        Ok(encode(&header, &claims, &self.private_key)?)
    }

    /// Decode and check a token.
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.name]);

        Ok(decode::<Claims>(token, &self.public_key, &validation)?.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_claims() {
        let manager = TokenManager::from_secret("https://designer.test/", "s3cr3t");
        let token = manager.create("65f0c0ffee0000000000abcd").unwrap();
        let claims = manager.decode(&token).unwrap();

        assert_eq!(claims.sub, "65f0c0ffee0000000000abcd");
        assert_eq!(claims.iss, "https://designer.test/");
        assert_eq!(claims.aud, DEFAULT_AUDIENCE);
        assert_eq!(claims.exp - claims.iat, EXPIRATION_TIME);
    }

    #[test]
    fn test_reject_foreign_token() {
        let manager = TokenManager::from_secret("designer", "s3cr3t");
        let other = TokenManager::from_secret("designer", "another");
        let token = other.create("user").unwrap();

        assert!(manager.decode(&token).is_err());
        assert!(manager.decode("loggedout").is_err());
    }

    #[test]
    fn test_from_config() {
        let config = Token {
            secret: Some("s3cr3t".into()),
            audience: Some("designer.example.com".into()),
            expires_in: Some(3600),
            ..Default::default()
        };
        let manager = TokenManager::from_config("designer", &config).unwrap();
        assert_eq!(manager.expires_in(), 3600);

        let claims = manager.decode(&manager.create("user").unwrap()).unwrap();
        assert_eq!(claims.aud, "designer.example.com");

        assert!(TokenManager::from_config("designer", &Token::default()).is_err());
    }
}
