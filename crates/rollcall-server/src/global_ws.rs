//! Notification WebSocket.

use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

pub async fn upgrade(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = handle_events_websocket(socket, state).await {
            tracing::error!(target: "rollcall::ws", "Events WebSocket error: {}", e);
        }
    })
}

/// Forward processor notifications to one client until either side closes.
pub async fn handle_events_websocket(socket: WebSocket, state: Arc<AppState>) -> Result<()> {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut event_rx = state.processor.subscribe();

    tracing::info!(target: "rollcall::ws", "Events WebSocket client connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            let msg = match event_rx.recv().await {
                Ok(msg) => msg,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(target: "rollcall::ws", skipped, "Client fell behind, notifications dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(_) => continue,
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Ping(_) => {
                    tracing::trace!(target: "rollcall::ws", "Received ping");
                }
                Message::Close(_) => {
                    tracing::debug!(target: "rollcall::ws", "Client closed connection");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    tracing::info!(target: "rollcall::ws", "Events WebSocket client disconnected");
    Ok(())
}
