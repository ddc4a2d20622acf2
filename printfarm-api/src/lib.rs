//! HTTP surface of the printer farm: webcam HLS, live event socket, diagnostics

pub mod http;

pub use http::{create_router, AppError, AppResult, AppState};
