// WebSocket transport for presence sessions
// Drives one Session per connection: frames in, replies and pings out

use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};

use super::server::AppState;
use crate::config::HeartbeatConfig;
use crate::presence::{
    CloseReason, HeartbeatMonitor, HeartbeatTick, PresenceHub, Session, SessionReply,
};
use crate::store::{DurableStore, EphemeralStore};

/// Upper bound on flushing queued frames after the session closed
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handle presence WebSocket upgrades on `/ws`
pub async fn handle_presence_websocket<E: EphemeralStore, D: DurableStore>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<E, D>>,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    let heartbeat = state.heartbeat;
    let shutdown = state.shutdown_signal();
    ws.on_upgrade(move |socket| run_connection(socket, hub, heartbeat, shutdown))
}

/// Run one connection to completion. Returns once the session is closed and
/// the outgoing queue is flushed (or abandoned).
pub async fn run_connection<E: EphemeralStore, D: DurableStore>(
    socket: WebSocket,
    hub: PresenceHub<E, D>,
    heartbeat: HeartbeatConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Forward queued frames to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    let mut session = Session::new(hub);
    let mut monitor = HeartbeatMonitor::new(heartbeat);
    tracing::debug!(connection_id = %session.id(), "Connection accepted");

    let stopping = async {
        let _ = shutdown.wait_for(|stopping| *stopping).await;
    };
    tokio::pin!(stopping);

    let reason = loop {
        tokio::select! {
            frame = receiver.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => break CloseReason::TransportError(e.to_string()),
                    None => break CloseReason::ClientClosed,
                };
                // Any inbound frame proves the peer is alive
                monitor.record_ack();

                let reply = match msg {
                    Message::Text(text) => session.handle_text(&text).await,
                    Message::Binary(data) => {
                        session.handle_text(&String::from_utf8_lossy(&data)).await
                    },
                    Message::Ping(_) | Message::Pong(_) => SessionReply::Ignore,
                    Message::Close(_) => break CloseReason::ClientClosed,
                };

                match reply {
                    SessionReply::Send(message) => match message.to_json() {
                        Ok(json) => {
                            if tx.send(Message::Text(json)).is_err() {
                                break CloseReason::TransportError("writer closed".to_string());
                            }
                        },
                        Err(e) => {
                            tracing::error!(connection_id = %session.id(), "Failed to serialize reply: {}", e);
                        },
                    },
                    SessionReply::Ignore => {},
                    SessionReply::Depart => break CloseReason::ClientDeparted,
                }
            },
            tick = monitor.tick() => match tick {
                HeartbeatTick::Ping => {
                    if tx.send(Message::Ping(Vec::new())).is_err() {
                        break CloseReason::TransportError("writer closed".to_string());
                    }
                    tracing::trace!(connection_id = %session.id(), "Sent heartbeat ping");
                },
                HeartbeatTick::Expired => {
                    tracing::info!(
                        connection_id = %session.id(),
                        silent_for = ?monitor.last_ack().elapsed(),
                        "Heartbeat expired"
                    );
                    break CloseReason::HeartbeatTimeout;
                },
            },
            _ = &mut stopping => break CloseReason::ServerShutdown,
            _ = &mut send_task => break CloseReason::TransportError("send failed".to_string()),
        }
    };

    session.close(reason.clone()).await;

    let close_frame = match reason {
        CloseReason::ClientDeparted => Some((close_code::NORMAL, "departed")),
        CloseReason::HeartbeatTimeout => Some((close_code::POLICY, "heartbeat timeout")),
        CloseReason::ServerShutdown => Some((close_code::AWAY, "server shutdown")),
        _ => None,
    };
    if let Some((code, text)) = close_frame {
        let _ = tx.send(Message::Close(Some(CloseFrame {
            code,
            reason: text.into(),
        })));
    }
    drop(tx);

    if !send_task.is_finished()
        && tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut send_task)
            .await
            .is_err()
    {
        send_task.abort();
    }
}
