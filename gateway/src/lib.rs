//! Booking gateway: a single-endpoint proxy in front of the Cal.com v2 API
//! that mirrors booking state into Postgres and reconciles provider
//! webhooks against that mirror.

use std::sync::Arc;

use axum::{
    http::{header, HeaderName, Method, StatusCode},
    routing::post,
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod cal;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod normalize;
pub mod schema;
pub mod webhook;

pub use crate::cal::CalClient;
pub use crate::config::AppConfig;
pub use crate::db::DbPool;
pub use crate::error::{ApiError, ApiResult};

/// Shared per-process state: configuration is read once at startup, never
/// from the ambient environment inside handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub cal: CalClient,
    pub http: reqwest::Client,
    /// Elevated-credential pool; `None` when persistence is unconfigured.
    pub db: Option<DbPool>,
}

impl AppState {
    pub fn new(config: AppConfig, db: Option<DbPool>) -> Self {
        let http = reqwest::Client::new();
        let cal = CalClient::new(http.clone(), &config.cal);
        Self {
            config: Arc::new(config),
            cal,
            http,
            db,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // One action endpoint; `/cal` kept for parity with the legacy edge
    // function path so existing clients keep working.
    let endpoint = post(handlers::dispatch)
        .options(preflight)
        .fallback(method_not_allowed);

    Router::new()
        .route("/", endpoint.clone())
        .route("/cal", endpoint)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
        .with_state(state)
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

/// Permissive CORS for the browser-based callers: any origin, the two
/// supported methods, and the fixed header set the clients send.
fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            header::CONTENT_TYPE,
        ])
}
