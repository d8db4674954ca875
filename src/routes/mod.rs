pub mod auth;
pub mod entity_search;
pub mod feedback;
pub mod folders;
pub mod follows;
pub mod papers;
pub mod profile;

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::{Json, Router};
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;

use crate::errors::AppError;
use crate::metrics;
use crate::middleware as app_middleware;
use crate::services::AppState;

pub fn create_router(state: AppState) -> Router {
    let (prometheus_layer, metrics_router) = metrics::setup_metrics();

    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .auth
                .frontend_url
                .parse::<HeaderValue>()
                .unwrap_or_else(|_| HeaderValue::from_static("http://localhost:5173")),
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let api_routes = Router::new()
        .nest("/api/auth", auth::router())
        .nest("/api/papers", papers::router())
        .nest("/api/profile", profile::router())
        .nest("/api/feedback", feedback::router())
        .nest("/api/folders", folders::router())
        .nest("/api/follows", follows::router())
        .nest("/api/entity-search", entity_search::router())
        .route("/healthz", get(health_check))
        .with_state(state.clone());

    Router::new()
        .merge(api_routes)
        .merge(metrics_router)
        .layer(
            ServiceBuilder::new()
                // Prometheus metrics (outermost - captures all requests)
                .layer(prometheus_layer)
                // Request deadline
                .layer(TimeoutLayer::new(state.config.request_timeout()))
                // Concurrency limit for backpressure
                .layer(ConcurrencyLimitLayer::new(
                    state.config.server.max_concurrent_requests,
                ))
                // Request ID propagation
                .layer(axum::middleware::from_fn(app_middleware::request_id))
                .layer(cors),
        )
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

// ----- shared parameter validation -----

pub(crate) fn validate_page(page: Option<u32>) -> Result<u32, AppError> {
    match page {
        None => Ok(1),
        Some(p) if p >= 1 => Ok(p),
        Some(_) => Err(AppError::validation("page must be at least 1")),
    }
}

pub(crate) fn validate_per_page(per_page: Option<u32>, default: u32) -> Result<u32, AppError> {
    match per_page {
        None => Ok(default),
        Some(p) if (1..=200).contains(&p) => Ok(p),
        Some(_) => Err(AppError::validation("per_page must be between 1 and 200")),
    }
}

pub(crate) fn validate_limit(
    limit: Option<u32>,
    default: usize,
    max: usize,
) -> Result<usize, AppError> {
    match limit {
        None => Ok(default),
        Some(l) if l >= 1 && (l as usize) <= max => Ok(l as usize),
        Some(_) => Err(AppError::validation(format!(
            "limit must be between 1 and {max}"
        ))),
    }
}

/// Split a comma-separated query value into trimmed, non-empty entries.
pub(crate) fn split_csv(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
