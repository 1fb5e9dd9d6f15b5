//! Send emails to users.
//!
//! Messages are published as CloudEvents on a RabbitMQ queue consumed by the
//! mail worker, which owns SMTP delivery.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{
    AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo,
};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use rand::distributions::{Alphanumeric, DistString};
use rand::rngs::OsRng;
use serde::Serialize;
use url::Url;

use crate::config::Mail;

const DEFAULT_AMPQ_HOST: &str = "localhost";
const DEFAULT_AMPQ_PORT: u16 = 5672;
const DEFAULT_AMPQ_VHOST: &str = "/";
const DEFAULT_FROM: &str = "Transformer Designer <no-reply@localhost>";

const CONTENT_ENCODING: &str = "utf8";
const CONTENT_TYPE: &str = "application/cloudevents+json";
const DATA_CONTENT_TYPE: &str = "application/json";
const CLOUDEVENT_VERSION: &str = "1.0";
const ID_LENGTH: usize = 12;

pub type Result<T> = std::result::Result<T, MailError>;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail channel is not configured")]
    NotConfigured,
    #[error("invalid AMQP scheme")]
    InvalidScheme,
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Amqp(#[from] lapin::Error),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

/// Outgoing email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl Message {
    /// Email carrying a password reset code.
    pub fn password_reset(to: &str, username: &str, code: &str, ttl_minutes: i64) -> Self {
        Self {
            to: to.to_owned(),
            subject: "Password Reset OTP".to_owned(),
            html: format!(
                "<h1>Password Reset</h1>\
                 <p>Hello {username},</p>\
                 <p>Your one-time password is <strong>{code}</strong>.</p>\
                 <p>It expires in {ttl_minutes} minutes. If you did not ask \
                 for a reset, ignore this email.</p>"
            ),
        }
    }
}

/// Port for sending emails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &Message) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct Cloudevent<'a> {
    specversion: &'static str,
    r#type: &'static str,
    source: &'static str,
    id: String,
    time: String,
    datacontenttype: &'static str,
    data: Content<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    from: &'a str,
    #[serde(flatten)]
    message: &'a Message,
}

/// RabbitMQ mail worker client.
#[derive(Debug, Clone, Default)]
pub struct MailManager {
    queue: String,
    from: String,
    conn: Option<Arc<Connection>>,
}

impl MailManager {
    /// Create a new [`MailManager`].
    pub async fn new(config: &Mail) -> Result<Self> {
        let addr = Url::parse(&config.address)?;
        let uri = AMQPUri {
            scheme: AMQPScheme::from_str(addr.scheme())
                .map_err(|_| MailError::InvalidScheme)?,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: config.username.clone(),
                    password: config.password.clone(),
                },
                host: addr.host_str().unwrap_or(DEFAULT_AMPQ_HOST).into(),
                port: addr.port().unwrap_or(DEFAULT_AMPQ_PORT),
            },
            vhost: config
                .vhost
                .clone()
                .unwrap_or(DEFAULT_AMPQ_VHOST.to_string()),
            query: AMQPQueryString {
                channel_max: config.pool,
                ..Default::default()
            },
        };

        let conn_config = ConnectionProperties::default()
            .with_connection_name("transformer_designer_mail".into());
        let conn = Connection::connect_uri(uri, conn_config).await?;

        tracing::info!(%addr, queue = config.queue, "rabbitmq connected");

        Ok(Self {
            queue: config.queue.clone(),
            from: config.from.clone().unwrap_or(DEFAULT_FROM.to_owned()),
            conn: Some(Arc::new(conn)),
        })
    }

    async fn create_channel(
        conn: Arc<Connection>,
        queue: &str,
    ) -> Result<Channel> {
        let channel = conn.create_channel().await?;
        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(channel)
    }

    fn create_event(data: Content) -> Cloudevent {
        let id = Alphanumeric.sample_string(&mut OsRng, ID_LENGTH);
        Cloudevent {
            specversion: CLOUDEVENT_VERSION,
            r#type: "com.transformer-designer.email",
            source: "com.transformer-designer.api",
            id,
            time: Utc::now().to_rfc3339(),
            datacontenttype: DATA_CONTENT_TYPE,
            data,
        }
    }
}

#[async_trait]
impl Mailer for MailManager {
    async fn send(&self, message: &Message) -> Result<()> {
        let Some(conn) = &self.conn else {
            tracing::warn!(subject = message.subject, "no mail channel configured");
            return Err(MailError::NotConfigured);
        };
        let channel = Self::create_channel(Arc::clone(conn), &self.queue).await?;

        let payload = Self::create_event(Content {
            from: &self.from,
            message,
        });
        let payload = serde_json::to_vec(&payload)?;

        channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_encoding(CONTENT_ENCODING.into())
                    .with_content_type(CONTENT_TYPE.into()),
            )
            .await?
            .await?;

        tracing::trace!(subject = message.subject, "mail event published");

        Ok(())
    }
}

/// In-memory mailer keeping every message, optionally failing.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryMailer {
    pub sent: std::sync::Mutex<Vec<Message>>,
    pub fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MemoryMailer {
    pub fn failing() -> Self {
        let mailer = Self::default();
        mailer.fail.store(true, std::sync::atomic::Ordering::SeqCst);
        mailer
    }

    pub fn last(&self) -> Option<Message> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[cfg(test)]
#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: &Message) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(MailError::NotConfigured);
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_reset_message() {
        let message =
            Message::password_reset("ada@example.com", "ada", "123456", 10);
        assert_eq!(message.to, "ada@example.com");
        assert_eq!(message.subject, "Password Reset OTP");
        assert!(message.html.contains("<strong>123456</strong>"));
        assert!(message.html.contains("10 minutes"));
    }

    #[test]
    fn test_cloudevent_shape() {
        let message =
            Message::password_reset("ada@example.com", "ada", "123456", 10);
        let event = MailManager::create_event(Content {
            from: DEFAULT_FROM,
            message: &message,
        });
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["specversion"], "1.0");
        assert_eq!(json["id"].as_str().unwrap().len(), ID_LENGTH);
        assert_eq!(json["data"]["to"], "ada@example.com");
        assert_eq!(json["data"]["from"], DEFAULT_FROM);
        assert_eq!(json["data"]["subject"], "Password Reset OTP");
    }

    #[tokio::test]
    async fn test_unconfigured_manager_fails() {
        let message = Message::password_reset("a@b.c", "a", "123456", 10);
        assert!(matches!(
            MailManager::default().send(&message).await,
            Err(MailError::NotConfigured)
        ));
    }
}
