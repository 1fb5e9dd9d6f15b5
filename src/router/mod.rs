//! HTTP API.
pub mod account;
pub mod design;
pub mod password;
pub mod status;

use std::sync::LazyLock;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, middleware};
use regex_lite::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError};

use crate::error::{Result, ServerError};
use crate::user::User;
use crate::AppState;

const BEARER: &str = "Bearer ";
const COOKIE_NAME: &str = "jwt";
const LOGGED_OUT: &str = "loggedout";
const LOGOUT_COOKIE_TTL: u64 = 10;
pub const TOKEN_TYPE: &str = "Bearer";

static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\- ]+$").unwrap());

/// Check username characters.
pub fn validate_username(username: &str) -> std::result::Result<(), ValidationError> {
    if USERNAME.is_match(username.trim()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_username"))
    }
}

/// Extractor deserializing a JSON body, then running its `validator` rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Read the token from `Authorization: Bearer` or the `jwt` cookie.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER))
    {
        return Some(token.trim());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().strip_prefix("jwt="))
        .find(|token| !token.is_empty() && *token != LOGGED_OUT)
}

/// Custom middleware for authentification.
///
/// Inserts the current [`User`] in request extensions.
pub async fn auth(
    State(state): State<AppState>,
    mut req: Request,
    next: middleware::Next,
) -> Result<Response> {
    let claims = bearer_token(req.headers())
        .ok_or(ServerError::Unauthorized)
        .and_then(|token| {
            state
                .token
                .decode(token)
                .map_err(|_| ServerError::Unauthorized)
        })?;

    let user = state
        .users
        .find_by_id(&claims.sub)
        .await
        .map_err(|err| match err {
            ServerError::UserNotFound => ServerError::Unauthorized,
            err => err,
        })?;

    req.extensions_mut().insert::<User>(user);
    Ok(next.run(req).await)
}

#[derive(Debug, Serialize)]
pub struct SessionData {
    pub user: User,
}

/// Body sent after register, login and password reset.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub status: &'static str,
    pub token_type: &'static str,
    pub token: String,
    pub expires_in: u64,
    pub data: SessionData,
}

fn cookie(value: &str, max_age: u64, secure: bool) -> Result<HeaderValue> {
    let mut cookie =
        format!("{COOKIE_NAME}={value}; Max-Age={max_age}; Path=/; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }

    HeaderValue::from_str(&cookie).map_err(|err| ServerError::Internal {
        details: "invalid cookie value".into(),
        source: Some(Box::new(err)),
    })
}

/// Sign a token for `user` and send it as body and cookie.
pub fn open_session(
    state: &AppState,
    status: StatusCode,
    user: User,
) -> Result<Response> {
    let token = state.token.create(&user.id)?;
    let expires_in = state.token.expires_in();
    let cookie = cookie(&token, expires_in, state.config.url.starts_with("https"))?;

    Ok((
        status,
        [(header::SET_COOKIE, cookie)],
        Json(Session {
            status: "success",
            token_type: TOKEN_TYPE,
            token,
            expires_in,
            data: SessionData { user },
        }),
    )
        .into_response())
}

/// Overwrite the session cookie.
pub fn close_session(state: &AppState) -> Result<Response> {
    let cookie = cookie(
        LOGGED_OUT,
        LOGOUT_COOKIE_TTL,
        state.config.url.starts_with("https"),
    )?;

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "status": "success" })),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rule() {
        assert!(validate_username("ada_lovelace").is_ok());
        assert!(validate_username("Ada 2").is_ok());
        assert!(validate_username("<script>").is_err());
        assert!(validate_username("a;b").is_err());
    }

    #[test]
    fn test_bearer_token_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; jwt=abc.def.ghi"),
        );
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer header.token.value"),
        );
        assert_eq!(bearer_token(&headers), Some("header.token.value"));

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("jwt=loggedout"));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_cookie_flags() {
        let value = cookie("abc", 60, false).unwrap();
        assert_eq!(
            value.to_str().unwrap(),
            "jwt=abc; Max-Age=60; Path=/; HttpOnly; SameSite=Lax"
        );
        assert!(
            cookie("abc", 60, true)
                .unwrap()
                .to_str()
                .unwrap()
                .ends_with("; Secure")
        );
    }
}
