use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Voice control
        .route("/voice/connect", post(handlers::connect_voice))
        .route("/voice/disconnect", post(handlers::disconnect_voice))
        .route("/voice/status", get(handlers::voice_status))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        // The chat UI calls from its own origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}
