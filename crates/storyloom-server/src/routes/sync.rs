//! WebSocket sync endpoint.
//!
//! One socket per editor per document. Inbound frames are routed to the
//! document host; the host's broadcast channel fans canonical events and
//! presence back out to every connected socket, including the sender's
//! own (self-echo is the client's implicit acknowledgement signal).

use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use futures_util::sink::SinkExt;
use futures_util::stream::{SplitSink, StreamExt};
use tracing::instrument;
use uuid::Uuid;

use storyloom_core::clock::Clock;
use storyloom_core::error::SyncError;
use storyloom_sync::wire::Frame;

use crate::state::AppState;

/// GET /{document_id}/ws
#[instrument(skip(state, upgrade))]
async fn ws_upgrade(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(state, document_id, socket))
}

async fn handle_socket(state: AppState, document_id: Uuid, socket: WebSocket) {
    let host = state.registry.get_or_create(document_id);
    let mut fan_out = host.subscribe();
    let (mut sink, mut stream) = socket.split();

    tracing::info!(document_id = %document_id, "editor connected");

    loop {
        tokio::select! {
            broadcast = fan_out.recv() => {
                match broadcast {
                    Ok(frame) => {
                        if send_frame(&mut sink, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        // The client will detect the sequence gap and
                        // recover from a snapshot.
                        tracing::warn!(
                            document_id = %document_id,
                            missed,
                            "slow consumer lagged behind event fan-out"
                        );
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            inbound = stream.next() => {
                let Some(Ok(message)) = inbound else { break };
                let Message::Text(text) = message else { continue };
                let frame: Frame = match serde_json::from_str(&text) {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::warn!(
                            document_id = %document_id,
                            error = %err,
                            "dropping unparseable frame"
                        );
                        continue;
                    }
                };
                let replies = match frame {
                    Frame::Hello { last_acknowledged_sequence, .. } => {
                        host.catch_up(last_acknowledged_sequence)
                    }
                    Frame::Push { commands, version_vector, .. } => {
                        host.handle_push(commands, &version_vector, state.clock.now())
                    }
                    Frame::Presence { .. } => {
                        host.broadcast_presence(frame);
                        Vec::new()
                    }
                    Frame::Ack { .. } | Frame::Event { .. } | Frame::Error { .. } => {
                        tracing::warn!(
                            document_id = %document_id,
                            "ignoring server-originated frame from client"
                        );
                        Vec::new()
                    }
                };
                let mut closed = false;
                for reply in replies {
                    if send_frame(&mut sink, &reply).await.is_err() {
                        closed = true;
                        break;
                    }
                }
                if closed {
                    break;
                }
            }
        }
    }

    tracing::info!(document_id = %document_id, "editor disconnected");
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: &Frame,
) -> Result<(), SyncError> {
    let text = serde_json::to_string(frame)
        .map_err(|e| SyncError::ValidationFailed(format!("unserializable frame: {e}")))?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| SyncError::NetworkUnavailable(e.to_string()))
}

/// Returns the WebSocket sync router.
pub fn router() -> Router<AppState> {
    Router::new().route("/{document_id}/ws", get(ws_upgrade))
}
