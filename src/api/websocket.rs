use crate::control::ControlChannel;
use crate::message::Message;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared application state for WebSocket handler
#[derive(Clone)]
pub struct WsAppState {
    pub control: Arc<ControlChannel>,
}

/// GET /api/ws - WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<WsAppState>>) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Create WebSocket router
pub fn create_ws_router(state: Arc<WsAppState>) -> Router {
    Router::new()
        .route("/api/ws", get(ws_handler))
        .with_state(state)
}

/// Handle WebSocket connection.
///
/// Runs one inbound and one outbound pump; whichever ends first tears down
/// the other. Nothing outside this connection is affected.
async fn handle_socket(socket: WebSocket, state: Arc<WsAppState>) {
    info!("WebSocket connection established");

    let outbound = state.control.subscribe().await;
    let (sink, stream) = socket.split();
    let mut send_task = tokio::spawn(pump_outbound(sink, outbound));
    let mut recv_task = tokio::spawn(pump_inbound(stream, Arc::clone(&state.control)));

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("WebSocket connection closed");
}

/// Forward this connection's outbound queue to the client, one JSON frame each.
///
/// Returning drops the queue, which unsubscribes the connection.
async fn pump_outbound<S>(mut sink: S, mut outbound: mpsc::Receiver<Message>)
where
    S: Sink<WsMessage> + Unpin,
    S::Error: Display,
{
    while let Some(msg) = outbound.recv().await {
        let json = match serde_json::to_string(&msg) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "Failed to serialize outbound message");
                continue;
            }
        };

        if let Err(e) = sink.send(WsMessage::Text(json)).await {
            warn!(error = %e, "Can't send, closing connection");
            break;
        }
        debug!(kind = ?msg.kind(), subtype = ?msg.sub_kind(), "Sent message to client");
    }
}

/// Decode client frames and hand them to the dispatcher
async fn pump_inbound<St, E>(mut stream: St, control: Arc<ControlChannel>)
where
    St: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<Message>(&text) {
                Ok(msg) => {
                    debug!(kind = ?msg.kind(), subtype = ?msg.sub_kind(), "Received message");
                    if let Err(e) = control.submit(msg).await {
                        warn!(error = %e, "Inbound message dropped");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed client frame");
                }
            },
            Ok(WsMessage::Close(_)) => {
                info!("WebSocket client disconnected");
                break;
            }
            Ok(_) => {
                // Ignore binary, ping, pong frames
            }
            Err(e) => {
                warn!(error = %e, "Can't receive, closing connection");
                break;
            }
        }
    }
}
