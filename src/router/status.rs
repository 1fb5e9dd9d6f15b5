//! Public server status.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::AppState;

/// Structured status.
#[derive(Serialize)]
pub struct Status {
    version: String,
    name: String,
    status: &'static str,
}

/// Handler of `GET /status.json`.
pub async fn status(State(state): State<AppState>) -> Json<Status> {
    Json(Status {
        version: env!("CARGO_PKG_VERSION").into(),
        name: state.config.name.clone(),
        status: "ok",
    })
}

/// Handler of `GET /metrics`, Prometheus text format.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use http_body_util::BodyExt;

    use crate::*;

    #[tokio::test]
    async fn test_status() {
        let state = test_state();
        let response = make_request(
            None,
            app(state.clone()),
            Method::GET,
            "/status.json",
            String::default(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["name"], state.config.name);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

        let response =
            make_request(None, app(state), Method::GET, "/metrics", String::default())
                .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
