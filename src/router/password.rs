//! Forgotten password routes.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::AppState;
use crate::error::Result;
use crate::router::{Valid, open_session};

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ForgotBody {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetBody {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(equal = 6, message = "OTP must contain 6 digits."))]
    pub otp: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
    pub password_confirm: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Sent {
    status: &'static str,
    message: &'static str,
}

/// Handler of `POST /forgot-password`.
pub async fn forgot(
    State(state): State<AppState>,
    Valid(body): Valid<ForgotBody>,
) -> Result<Json<Sent>> {
    state.reset.issue(&body.email).await?;

    Ok(Json(Sent {
        status: "success",
        message: "OTP sent to email!",
    }))
}

/// Handler of `POST /reset-password`.
pub async fn reset(
    State(state): State<AppState>,
    Valid(body): Valid<ResetBody>,
) -> Result<Response> {
    if body
        .password_confirm
        .as_ref()
        .is_some_and(|confirm| *confirm != body.password)
    {
        let mut errors = ValidationErrors::new();
        errors.add(
            "passwordConfirm",
            ValidationError::new("must_match")
                .with_message("Passwords do not match.".into()),
        );
        return Err(errors.into());
    }

    let user = state
        .reset
        .consume(&body.email, &body.otp, &body.password)
        .await?;

    open_session(&state, StatusCode::OK, user)
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};

    use crate::*;

    async fn json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn register(state: &AppState) {
        let response = make_request(
            None,
            app(state.clone()),
            Method::POST,
            "/register",
            json!({
                "username": "ada",
                "email": "ada@example.com",
                "password": "correct horse",
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_forgot_unknown_email() {
        let state = test_state();
        let response = make_request(
            None,
            app(state),
            Method::POST,
            "/forgot-password",
            json!({"email": "nobody@example.com"}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reset_flow() {
        let (state, mailer) = test_state_with_mailer();
        register(&state).await;

        let response = make_request(
            None,
            app(state.clone()),
            Method::POST,
            "/forgot-password",
            json!({"email": "ada@example.com"}).to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["message"], "OTP sent to email!");

        let html = mailer.last().unwrap().html;
        let start = html.find("<strong>").unwrap() + "<strong>".len();
        let code = &html[start..start + 6];

        let response = make_request(
            None,
            app(state.clone()),
            Method::POST,
            "/reset-password",
            json!({
                "email": "ada@example.com",
                "otp": code,
                "password": "battery staple",
                "passwordConfirm": "battery stapler",
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["errors"][0]["field"], "passwordConfirm");

        let response = make_request(
            None,
            app(state.clone()),
            Method::POST,
            "/reset-password",
            json!({
                "email": "ada@example.com",
                "otp": code,
                "password": "battery staple",
                "passwordConfirm": "battery staple",
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert!(body["token"].is_string());
        assert_eq!(body["data"]["user"]["email"], "ada@example.com");

        let response = make_request(
            None,
            app(state),
            Method::POST,
            "/login",
            json!({"email": "ada@example.com", "password": "battery staple"})
                .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_reset_without_request() {
        let state = test_state();
        register(&state).await;

        let response = make_request(
            None,
            app(state),
            Method::POST,
            "/reset-password",
            json!({
                "email": "ada@example.com",
                "otp": "123456",
                "password": "battery staple",
            })
            .to_string(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["detail"], "OTP is invalid or has expired");
    }
}
