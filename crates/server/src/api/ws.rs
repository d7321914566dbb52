//! WebSocket live notifier.
//!
//! Each connection subscribes to one queue's broadcast topic and relays it
//! verbatim. The relay owns the sink half; this task watches the receive half
//! and cancels the relay when the client goes away.

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{
        rejection::QueryRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use queueline_core::{relay, NotifierError, NotifierSession};

use super::error::{bad_request, ApiError};
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub queue_id: Option<i64>,
}

/// Sink half of a WebSocket, as a notifier session.
pub struct WsSession {
    sink: SplitSink<WebSocket, Message>,
}

impl WsSession {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl NotifierSession for WsSession {
    async fn send_text(&mut self, text: String) -> Result<(), NotifierError> {
        self.sink
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| NotifierError::Send(e.to_string()))
    }

    async fn send_ping(&mut self) -> Result<(), NotifierError> {
        self.sink
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(|e| NotifierError::Send(e.to_string()))
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<WsParams>, QueryRejection>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let Query(params) = params.map_err(|e| bad_request(e.body_text()))?;
    let queue_id = match params.queue_id {
        Some(id) if id > 0 => id,
        Some(id) => return Err(bad_request(format!("invalid queue_id: {}", id))),
        None => return Err(bad_request("queue_id is required")),
    };

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, queue_id)))
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, queue_id: i64) {
    let (sink, mut receiver) = socket.split();
    let subscription = state.publisher().subscribe(queue_id);
    let ping_interval = state.config().notifier.ping_interval();
    let (cancel_tx, cancel_rx) = watch::channel(false);

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    info!("WebSocket client connected to queue {}", queue_id);

    let mut relay_task = tokio::spawn(async move {
        let mut session = WsSession::new(sink);
        relay(&mut session, subscription, ping_interval, cancel_rx).await
    });

    // Clients are not expected to send anything but close frames and pongs.
    let watch_close = async {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    debug!("WebSocket client requested close");
                    break;
                }
                Ok(Message::Text(text)) => {
                    debug!("Ignoring text message from client: {}", text.as_str());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    };

    let outcome = tokio::select! {
        _ = watch_close => {
            cancel_tx.send_replace(true);
            relay_task.await
        }
        outcome = &mut relay_task => outcome,
    };

    match outcome {
        Ok(outcome) => info!(
            "WebSocket client of queue {} disconnected ({:?}, {} forwarded, {} lagged)",
            queue_id, outcome.end, outcome.forwarded, outcome.lagged
        ),
        Err(e) => warn!("Relay for queue {} failed: {}", queue_id, e),
    }
    WS_CONNECTIONS_ACTIVE.dec();
}
