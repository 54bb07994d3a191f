//! API route modules.
//!
//! Organizes routes by resource type.

pub mod audio;
pub mod health;
pub mod sessions;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/sessions", sessions::router())
        .nest("/health", health::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
