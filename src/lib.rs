//! Transformer Designer computes design sheets of current and potential
//! transformers, and manages the accounts allowed to use them.

#![forbid(unsafe_code)]
pub mod clock;
pub mod config;
mod crypto;
mod database;
pub mod design;
pub mod error;
mod mail;
mod predictor;
mod reset;
mod router;
pub mod telemetry;
mod token;
mod user;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    token: Option<&str>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request =
            request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// In-memory state with a recording mailer.
#[cfg(test)]
pub fn test_state_with_mailer() -> (AppState, Arc<mail::MemoryMailer>) {
    let config = Arc::new(config::Configuration::default());
    let crypto = Arc::new(
        crypto::PasswordManager::new(Some(config::Argon2 {
            memory_cost: 1024,
            iterations: 1,
            parallelism: 1,
            hash_length: 32,
        }))
        .unwrap(),
    );
    let repo: Arc<dyn user::UserRepository> =
        Arc::new(user::MemoryRepository::new());
    let mailer = Arc::new(mail::MemoryMailer::default());

    let state = AppState {
        users: user::UserService::new(Arc::clone(&repo), Arc::clone(&crypto)),
        reset: reset::PasswordReset::new(
            repo,
            crypto,
            mailer.clone(),
            Arc::new(clock::SystemClock),
            config.reset.clone(),
        ),
        token: token::TokenManager::from_secret(&config.url, "test secret"),
        predictor: None,
        metrics: None,
        config,
    };

    (state, mailer)
}

#[cfg(test)]
pub fn test_state() -> AppState {
    test_state_with_mailer().0
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub users: user::UserService,
    pub reset: reset::PasswordReset,
    pub token: token::TokenManager,
    pub predictor: Option<predictor::Predictor>,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE, header::SET_COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    let protected = Router::new()
        // `GET /me` goes to `me`. Authorization required.
        .route("/me", get(router::account::me))
        .route_layer(AxumMiddleware::from_fn_with_state(
            state.clone(),
            router::auth,
        ));

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route("/metrics", get(router::status::metrics))
        .route("/register", post(router::account::register))
        .route("/login", post(router::account::login))
        .route("/logout", get(router::account::logout))
        .route("/forgot-password", post(router::password::forgot))
        .route("/reset-password", post(router::password::reset))
        .route("/design/ct", post(router::design::ct))
        .route("/design/pt", post(router::design::pt))
        .route("/predict/ct", post(router::design::predict_ct))
        .route("/predict/pt", post(router::design::predict_pt))
        .merge(protected)
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file. let it in memory.
    let path = std::env::var("CONFIG_PATH").unwrap_or_default();
    let config = config::Configuration::default()
        .path(path.into())
        .read()?;

    let repo: Arc<dyn user::UserRepository> = match &config.postgres {
        Some(cfg) => Arc::new(user::PostgresRepository::new(
            database::connect(cfg).await?,
        )),
        None => {
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, accounts are kept in memory"
            );
            Arc::new(user::MemoryRepository::new())
        },
    };

    let crypto = Arc::new(crypto::PasswordManager::new(config.argon2.clone())?);

    // handle jwt.
    let token = token::TokenManager::from_config(
        &config.url,
        &config.token.clone().unwrap_or_default(),
    )?;

    // handle mail sender.
    let mailer: Arc<dyn mail::Mailer> = match &config.mail {
        Some(cfg) => Arc::new(mail::MailManager::new(cfg).await?),
        None => {
            tracing::warn!("missing `mail` entry on `config.yaml` file, password reset is unavailable");
            Arc::new(mail::MailManager::default())
        },
    };

    let predictor = config
        .predictor
        .as_ref()
        .map(|cfg| predictor::Predictor::new(&cfg.url));

    Ok(AppState {
        users: user::UserService::new(Arc::clone(&repo), Arc::clone(&crypto)),
        reset: reset::PasswordReset::new(
            repo,
            crypto,
            mailer,
            Arc::new(clock::SystemClock),
            config.reset.clone(),
        ),
        token,
        predictor,
        metrics: None,
        config,
    })
}
