pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod moderation;

use axum::{Router, middleware as axum_middleware, routing::{any, get}};

use crate::auth::AppState;

/// Routes without transport layers; the binary adds CORS and tracing on top.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api", any(handler::handle_action))
        .route("/health", get(handler::health))
        .layer(axum_middleware::from_fn(middleware::answer_options))
        .with_state(state)
}
