//! Wire messages exchanged over the presence WebSocket.

use serde::{Deserialize, Serialize};

use crate::error::{PresenceError, Result};

/// Characters that would change the meaning of a status tree path
const RESERVED_ID_CHARS: &[char] = &['/', '.', '#', '$', '[', ']', '?'];

/// Raw inbound frame; every field optional so validation can name what is missing
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
    user_id: Option<String>,
    is_online: Option<bool>,
    last_seen: Option<i64>,
}

/// Validated client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Application-level liveness probe
    Ping,
    /// Identity-bearing presence update
    Presence {
        user_id: String,
        is_online: bool,
        /// Client clock, epoch milliseconds
        last_seen: Option<i64>,
    },
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self> {
        let frame: InboundFrame = serde_json::from_str(text)
            .map_err(|e| PresenceError::MalformedMessage(format!("invalid JSON: {}", e)))?;

        match frame.kind.as_deref() {
            Some("ping") => return Ok(ClientMessage::Ping),
            None | Some("presence") => {},
            Some(other) => {
                return Err(PresenceError::MalformedMessage(format!(
                    "unknown message type '{}'",
                    other
                )))
            },
        }

        let user_id = frame
            .user_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| PresenceError::MalformedMessage("missing userId".to_string()))?;
        validate_user_id(&user_id)?;
        let is_online = frame
            .is_online
            .ok_or_else(|| PresenceError::MalformedMessage("missing isOnline".to_string()))?;
        if let Some(last_seen) = frame.last_seen {
            if last_seen < 0 {
                return Err(PresenceError::MalformedMessage(format!(
                    "negative lastSeen {}",
                    last_seen
                )));
            }
        }

        Ok(ClientMessage::Presence {
            user_id,
            is_online,
            last_seen: frame.last_seen,
        })
    }
}

/// User ids become a key in the status tree
fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id
        .chars()
        .any(|c| c.is_control() || RESERVED_ID_CHARS.contains(&c))
    {
        return Err(PresenceError::MalformedMessage(format!(
            "userId {:?} contains a reserved character",
            user_id
        )));
    }
    Ok(())
}

/// Server → client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Pong,
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
