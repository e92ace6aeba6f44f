//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::BaseRunLauncher;
use crate::server::routes::{health_handler, trigger_run_handler};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub launcher: Arc<dyn BaseRunLauncher>,
}

/// Build the Axum application router
pub fn build_app(launcher: Arc<dyn BaseRunLauncher>) -> Router {
    let app_state = AppState { launcher };

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/runs", post(trigger_run_handler))
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
