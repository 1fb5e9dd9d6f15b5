//! Error handler for the designer API.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::{Error as SQLxError, postgres::PgDatabaseError};
use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error("email or username already in use")]
    AccountExists,

    #[error("incorrect email or password")]
    InvalidCredentials,

    #[error("there is no user with this email address")]
    UserNotFound,

    #[error("OTP is invalid or has expired")]
    ResetInvalidOrExpired,

    #[error("invalid OTP")]
    InvalidOtp,

    #[error("there was an error sending the email, try again later")]
    EmailDelivery(Box<dyn std::error::Error + Send + Sync>),

    #[error("prediction service failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("prediction service is not configured")]
    PredictorDisabled,

    #[error(transparent)]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("invalid 'Authorization' header")]
    Unauthorized,
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut fields = errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect::<Vec<_>>();
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    fields
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Validation(validation_errors) => {
                response.errors(validation_errors)
            },

            ServerError::Axum(rejection) => response
                .title("Malformed request body.")
                .details(&rejection.body_text())
                .status(rejection.status()),

            ServerError::AccountExists => {
                response.title("Account already exists.")
            },

            ServerError::InvalidCredentials => response
                .title("Authentication failed.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::UserNotFound => response
                .title("Account not found.")
                .status(StatusCode::NOT_FOUND),

            ServerError::ResetInvalidOrExpired | ServerError::InvalidOtp => {
                response.title("Password reset failed.")
            },

            ServerError::EmailDelivery(err) => {
                tracing::error!(error = %err, "email delivery failed");
                response
                    .title("Email could not be delivered.")
                    .status(StatusCode::BAD_GATEWAY)
            },

            ServerError::Upstream(err) => {
                tracing::warn!(error = %err, "prediction service failed");
                response
                    .title("Prediction service unavailable.")
                    .details(
                        &err.status()
                            .map(|s| format!("upstream answered {s}"))
                            .unwrap_or_else(|| {
                                "upstream is unreachable".to_owned()
                            }),
                    )
                    .status(StatusCode::BAD_GATEWAY)
            },

            ServerError::PredictorDisabled => response
                .title("Prediction service unavailable.")
                .status(StatusCode::SERVICE_UNAVAILABLE),

            ServerError::Sql(err) => {
                tracing::error!(error = %err, "sql request failed");
                ResponseError::default().details(
                    err.as_database_error()
                        .and_then(|e| {
                            e.try_downcast_ref::<PgDatabaseError>()
                                .and_then(|e| e.detail())
                        })
                        .unwrap_or_default(),
                )
            },

            ServerError::Token(err) => {
                tracing::error!(error = %err, "token error");
                ResponseError::default()
            },

            ServerError::Crypto(err) => {
                tracing::error!(error = %err, "cryptographic error");
                ResponseError::default()
            },

            ServerError::Unauthorized => response
                .title("Missing or invalid 'Authorization' header.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");

                ResponseError::default()
            },
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
