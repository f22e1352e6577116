//! Per-connection presence state machine.
//!
//! `Connecting → Bound → Closing → Closed`. The session never touches the
//! socket; the WebSocket driver feeds it messages and acts on the replies.

use std::fmt;

use super::hub::PresenceHub;
use super::protocol::{ClientMessage, ServerMessage};
use super::reconciler::ReconcileOutcome;
use super::registry::ConnectionId;
use crate::error::{PresenceError, Result};
use crate::store::{DurableStore, EphemeralStore};
use crate::time_utils::now_millis;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, no identity yet
    Connecting,
    Bound { user_id: String },
    Closing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Close frame or end of stream
    ClientClosed,
    /// Client announced `isOnline: false`
    ClientDeparted,
    HeartbeatTimeout,
    TransportError(String),
    ServerShutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ClientClosed => write!(f, "client closed"),
            CloseReason::ClientDeparted => write!(f, "client departed"),
            CloseReason::HeartbeatTimeout => write!(f, "heartbeat timeout"),
            CloseReason::TransportError(e) => write!(f, "transport error: {}", e),
            CloseReason::ServerShutdown => write!(f, "server shutdown"),
        }
    }
}

/// What the driver should do after a message was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionReply {
    Send(ServerMessage),
    /// Message dropped; keep the connection open
    Ignore,
    /// Client is leaving; start closing
    Depart,
}

pub struct Session<E: EphemeralStore, D: DurableStore> {
    id: ConnectionId,
    state: SessionState,
    hub: PresenceHub<E, D>,
}

impl<E: EphemeralStore, D: DurableStore> Session<E, D> {
    pub fn new(hub: PresenceHub<E, D>) -> Self {
        Self {
            id: hub.open_connection(),
            state: SessionState::Connecting,
            hub,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn user_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Bound { user_id } => Some(user_id),
            _ => None,
        }
    }

    /// Handle a raw text frame. Malformed input is logged, counted and dropped.
    pub async fn handle_text(&mut self, text: &str) -> SessionReply {
        let result = match ClientMessage::parse(text) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(reply) => reply,
            Err(e) => {
                self.hub.stats().record_malformed_message();
                tracing::warn!(connection_id = %self.id, "Dropping message: {}", e);
                SessionReply::Ignore
            },
        }
    }

    pub async fn handle_message(&mut self, message: ClientMessage) -> Result<SessionReply> {
        let (user_id, is_online, last_seen) = match message {
            ClientMessage::Ping => return Ok(SessionReply::Send(ServerMessage::Pong)),
            ClientMessage::Presence {
                user_id,
                is_online,
                last_seen,
            } => (user_id, is_online, last_seen.unwrap_or_else(now_millis)),
        };

        let bound = match &self.state {
            SessionState::Closing | SessionState::Closed => return Ok(SessionReply::Ignore),
            SessionState::Connecting => None,
            SessionState::Bound { user_id } => Some(user_id.clone()),
        };

        match bound {
            None if !is_online => {
                tracing::debug!(connection_id = %self.id, %user_id, "Departure before binding");
                Ok(SessionReply::Depart)
            },
            None => {
                let result = match self.hub.bind(self.id, &user_id, last_seen).await {
                    Err(e @ PresenceError::IdentityMismatch { .. }) => return Err(e),
                    Err(PresenceError::ShuttingDown) => {
                        tracing::debug!(
                            connection_id = %self.id,
                            %user_id,
                            "Bind refused during shutdown"
                        );
                        return Ok(SessionReply::Ignore);
                    },
                    other => other,
                };
                tracing::debug!(connection_id = %self.id, %user_id, "Session bound");
                self.state = SessionState::Bound { user_id };
                self.report(result);
                Ok(SessionReply::Send(ServerMessage::Pong))
            },
            Some(bound) if bound != user_id => Err(PresenceError::IdentityMismatch {
                bound,
                requested: user_id,
            }),
            Some(_) if !is_online => Ok(SessionReply::Depart),
            Some(_) => {
                let result = self.hub.keep_alive(self.id, last_seen).await;
                self.report(result);
                Ok(SessionReply::Send(ServerMessage::Pong))
            },
        }
    }

    /// Reconciliation problems are operator-facing only; the session carries on
    fn report(&self, result: Result<ReconcileOutcome>) {
        match result {
            Ok(outcome) => {
                tracing::trace!(connection_id = %self.id, ?outcome, "Presence update applied")
            },
            Err(e) if e.is_degraded_only() => {
                tracing::debug!(connection_id = %self.id, "Degraded presence: {}", e)
            },
            Err(e) => {
                tracing::debug!(connection_id = %self.id, "Presence update not applied: {}", e)
            },
        }
    }

    /// Run the closing transition. Idempotent.
    pub async fn close(&mut self, reason: CloseReason) {
        let previous = std::mem::replace(&mut self.state, SessionState::Closing);
        if matches!(previous, SessionState::Closed) {
            self.state = SessionState::Closed;
            return;
        }

        if reason == CloseReason::HeartbeatTimeout {
            self.hub.stats().record_heartbeat_timeout();
        }

        match previous {
            SessionState::Bound { user_id } => {
                self.hub.unbind(self.id).await;
                tracing::info!(connection_id = %self.id, %user_id, %reason, "Session closed");
            },
            _ => {
                tracing::debug!(connection_id = %self.id, %reason, "Unbound session closed");
            },
        }

        self.state = SessionState::Closed;
    }
}

impl<E: EphemeralStore, D: DurableStore> Drop for Session<E, D> {
    fn drop(&mut self) {
        // Aborted or panicked connection tasks skip `close`; release the
        // registry binding anyway
        if let SessionState::Bound { .. } | SessionState::Closing = self.state {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let hub = self.hub.clone();
                let id = self.id;
                handle.spawn(async move {
                    hub.unbind(id).await;
                });
            }
        }
    }
}
