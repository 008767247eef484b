use axum::{
    Router,
    routing::{any, get},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod config;
pub mod cors;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod validate;

pub use state::AppState;

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/recommend-photo", any(handlers::recommend_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
