//! Read-only printer overview

use axum::{extract::State, routing::get, Json, Router};
use printfarm_device::ConnectionState;
use printfarm_livestream::RelayStatus;
use serde::Serialize;

use crate::http::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterSummary {
    pub slug: String,
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub has_camera: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay: Option<RelayStatus>,
}

pub fn create_printers_router() -> Router<AppState> {
    Router::new().route("/api/printers", get(list_printers))
}

/// GET /api/printers, in registration order
pub async fn list_printers(State(state): State<AppState>) -> Json<Vec<PrinterSummary>> {
    let printers = state
        .registry
        .iter()
        .map(|(slug, entry)| PrinterSummary {
            slug: slug.to_string(),
            state: entry.session.state(),
            name: entry.session.current_settings().map(|s| s.name),
            has_camera: entry.session.has_camera(),
            relay: entry.relay.is_started().then(|| entry.relay.status()),
        })
        .collect();
    Json(printers)
}
