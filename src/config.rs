//! Configuration manager.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const DEFAULT_PORT: u16 = 5000;
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Domain name of current instance.
    pub url: String,
    /// Port the HTTP server listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to JsonWebToken configuration.
    #[serde(skip_serializing)]
    pub token: Option<Token>,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
    /// Related to automatic mail sending.
    #[serde(skip_serializing)]
    pub mail: Option<Mail>,
    /// Related to password reset.
    #[serde(default, skip_serializing)]
    pub reset: Reset,
    /// Related to the error prediction model server.
    #[serde(skip_serializing)]
    pub predictor: Option<Predictor>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: env!("CARGO_CRATE_NAME").to_owned(),
            url: "http://localhost".to_owned(),
            port: DEFAULT_PORT,
            version: VERSION.to_owned(),
            path: PathBuf::default(),
            token: None,
            postgres: None,
            argon2: None,
            mail: None,
            reset: Reset::default(),
            predictor: None,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Mail worker configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    /// Hostname:(?port) for RabbitMQ instance.
    pub address: String,
    /// RabbitMQ default vhost.
    pub vhost: Option<String>,
    /// RabbitMQ username to access queue.
    pub username: String,
    /// RabbitMQ password to access queue.
    pub password: String,
    /// Max channel connections.
    pub pool: Option<u16>,
    /// Queue name to send mailing events.
    pub queue: String,
    /// `From` header, e.g. `Transformer Designer <no-reply@example.com>`.
    pub from: Option<String>,
}

/// Json Web Token configuration.
///
/// A `secret` selects HS256, otherwise the PEM pair selects ES384.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Token {
    pub secret: Option<String>,
    pub public_key_pem: Option<String>,
    pub private_key_pem: Option<String>,
    /// Update token audience.
    pub audience: Option<String>,
    /// Token lifetime in seconds.
    pub expires_in: Option<u64>,
}

/// Password reset configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reset {
    /// OTP lifetime in seconds.
    pub otp_ttl: i64,
    /// Answer unknown emails as if a code had been sent.
    pub conceal_unknown_accounts: bool,
}

impl Default for Reset {
    fn default() -> Self {
        Self {
            otp_ttl: 60 * 10, // 10 minutes.
            conceal_unknown_accounts: false,
        }
    }
}

/// Error prediction model server.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predictor {
    /// Base URL, `/predict` is appended.
    pub url: String,
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        let file = match File::open(file_path) {
            Ok(file) => file,
            Err(err) => {
                tracing::error!(
                    path = %file_path.display(),
                    error = %err,
                    "cannot open configuration file, using defaults"
                );
                return Ok(Arc::new(Self::default()));
            },
        };

        let mut config: Configuration = match serde_yaml::from_reader(file) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(
                    path = %file_path.display(),
                    error = %err,
                    "invalid configuration file, using defaults"
                );
                return Ok(Arc::new(Self::default()));
            },
        };

        config.version = VERSION.to_owned();
        config.url = self.normalize_url(&config.url)?;
        if let Some(predictor) = config.predictor.as_mut() {
            predictor.url = self
                .normalize_url(&predictor.url)?
                .trim_end_matches('/')
                .to_owned();
        }

        Ok(Arc::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        let config = Configuration::default();
        assert_eq!(
            config.normalize_url("designer.example.com").unwrap(),
            "https://designer.example.com/"
        );
        assert_eq!(
            config.normalize_url("http://127.0.0.1:5001").unwrap(),
            "http://127.0.0.1:5001/"
        );
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
name: designer
url: designer.example.com
port: 8080
token:
  secret: changeme
reset:
  otp_ttl: 300
  conceal_unknown_accounts: true
"#;
        let config: Configuration = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.reset.otp_ttl, 300);
        assert!(config.reset.conceal_unknown_accounts);
        assert_eq!(
            config.token.and_then(|t| t.secret).as_deref(),
            Some("changeme")
        );
        assert!(config.postgres.is_none());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = Configuration::default()
            .path(PathBuf::from("/nonexistent/config.yaml"))
            .read()
            .unwrap();
        assert_eq!(config.reset, Reset::default());
        assert_eq!(config.version, VERSION);
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let path = std::env::temp_dir()
            .join(format!("designer-invalid-{}.yaml", std::process::id()));
        std::fs::write(&path, "name: [unclosed\nport: nope\n").unwrap();

        let config = Configuration::default().path(path.clone()).read().unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.version, VERSION);
        assert!(config.token.is_none());
    }
}
