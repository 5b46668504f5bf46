//! `GET /events`: a WebSocket that mirrors the Pool Manager's global
//! outbound event stream (spec.md §4.11 item 3). One connection, one
//! `broadcast::Receiver`, forward-only — grounded in the teacher's
//! `api/ws.rs` push-loop shape, simplified since there is no client input
//! to process here (the stream is read-only).

use super::state::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub async fn events_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_events(socket, state))
}

async fn stream_events(mut socket: WebSocket, state: Arc<AppState>) {
    let mut rx = state.subscribe().await;
    info!("control-plane event stream connected");

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let Ok(json) = serde_json::to_string(&event) else { continue };
                        if let Err(e) = socket.send(Message::Text(json.into())).await {
                            debug!(error = %e, "event stream send failed, disconnecting");
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event stream subscriber lagged, events dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // read-only stream, inbound frames are ignored
                    Some(Err(e)) => {
                        debug!(error = %e, "event stream recv error, disconnecting");
                        break;
                    }
                }
            }
        }
    }

    info!("control-plane event stream disconnected");
}
