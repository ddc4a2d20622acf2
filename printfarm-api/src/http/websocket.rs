//! Live event channel
//!
//! On connect the viewer receives the hub's replay (settings then status for
//! each printer), then every event as it is published. Client frames other
//! than Close are ignored.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use printfarm_hub::Frame;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::http::AppState;

/// Per-viewer buffer; a viewer that falls this far behind misses events
const VIEWER_BUFFER: usize = 1000;

pub async fn websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.max_message_size(64 * 1024)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let hub = state.registry.hub().clone();
    let (tx, mut rx) = mpsc::channel::<Frame>(VIEWER_BUFFER);
    let viewer_id = hub.attach(tx);
    info!(viewer = %viewer_id, "Live channel opened");

    let (mut ws_sink, mut ws_stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(frame.to_string().into())).await {
                debug!(viewer = %viewer_id, error = %e, "Failed to send live event");
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut writer => break,
            message = ws_stream.next() => match message {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(viewer = %viewer_id, error = %e, "Live channel read error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    hub.detach(viewer_id);
    writer.abort();
    info!(viewer = %viewer_id, "Live channel closed");
}
