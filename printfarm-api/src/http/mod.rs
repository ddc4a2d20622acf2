// Module: http
// Webcam HLS, live event socket and read-only diagnostics

pub mod error;
pub mod health;
pub mod printers;
pub mod webcam;
pub mod websocket;

use std::sync::Arc;

use axum::{routing::get, Router};
use printfarm_device::DeviceRegistry;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<DeviceRegistry>,
}

/// Create the HTTP router with all routes
pub fn create_router(registry: Arc<DeviceRegistry>) -> Router {
    let state = AppState { registry };

    Router::new()
        .merge(health::create_health_router())
        .merge(printers::create_printers_router())
        .merge(webcam::create_webcam_router())
        // Live event channel
        .route("/ws", get(websocket::websocket_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
