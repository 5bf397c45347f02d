//! WebSocket push channel for dashboards and other observers.
//!
//! On connect the observer receives an `initial_snapshot` of all pending
//! requests, then `created`/`update` events in per-request causal order.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio_stream::wrappers::ReceiverStream;

use crate::AppState;

/// GET /stream — upgrade to the push channel
pub async fn stream_updates(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let handle = match state.hub.connect().await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("observer connect failed: {e}");
            return;
        }
    };
    let observer_id = handle.id();
    let (mut sender, mut receiver) = socket.split();

    // Forward hub messages to the socket until either side goes away.
    let mut updates = ReceiverStream::new(handle.rx);
    let send_task = tokio::spawn(async move {
        while let Some(msg) = updates.next().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("failed to serialize push message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // The channel is push-only; we only watch the receive side for the close.
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    // One observer going away never affects the others.
    state.hub.disconnect(observer_id);
    send_task.abort();
}
