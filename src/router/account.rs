//! Account routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::router::{SessionData, Valid, close_session, open_session};
use crate::user::User;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct RegisterBody {
    #[validate(
        length(
            min = 2,
            max = 50,
            message = "Username must contain between 2 and 50 characters."
        ),
        custom(
            function = "crate::router::validate_username",
            message = "Username must be alphanumeric."
        )
    )]
    pub username: String,
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 255,
        message = "Password must contain at least 8 characters."
    ))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct LoginBody {
    #[validate(email(message = "Email must be formatted."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
}

/// Handler of `POST /register`.
pub async fn register(
    State(state): State<AppState>,
    Valid(body): Valid<RegisterBody>,
) -> Result<Response> {
    let user = state
        .users
        .register(body.username.trim(), &body.email, &body.password)
        .await?;

    open_session(&state, StatusCode::CREATED, user)
}

/// Handler of `POST /login`.
pub async fn login(
    State(state): State<AppState>,
    Valid(body): Valid<LoginBody>,
) -> Result<Response> {
    let user = state.users.authenticate(&body.email, &body.password).await?;

    tracing::info!(user_id = user.id, "user logged in");
    open_session(&state, StatusCode::OK, user)
}

/// Handler of `GET /logout`.
pub async fn logout(State(state): State<AppState>) -> Result<Response> {
    close_session(&state)
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    status: &'static str,
    data: SessionData,
}

/// Handler of `GET /me`. Authorization required.
pub async fn me(Extension(user): Extension<User>) -> Json<MeResponse> {
    Json(MeResponse {
        status: "success",
        data: SessionData { user },
    })
}
