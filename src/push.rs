//! Multicast push delivery through an HTTP relay.
//!
//! The relay accepts `{tokens, notification: {title, body}}` and answers with
//! one `{success, error?}` entry per token, in token order.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{PushConfig, Secret};
use crate::error::{PresenceError, Result};

const RELAY_TIMEOUT: Duration = Duration::from_secs(15);

/// Characters of a delivery token kept when it appears in logs
const TOKEN_LOG_PREFIX: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
struct MulticastRequest<'a> {
    tokens: &'a [String],
    notification: &'a PushMessage,
}

#[derive(Deserialize)]
struct MulticastResponse {
    responses: Vec<DeliveryResult>,
}

pub struct PushRelay {
    client: reqwest::Client,
    url: String,
    auth_token: Option<Secret>,
}

impl PushRelay {
    pub fn new(url: impl Into<String>, auth_token: Option<Secret>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(RELAY_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
            auth_token,
        })
    }

    pub fn from_config(config: &PushConfig) -> Result<Self> {
        Self::new(config.relay_url.clone(), config.auth_token.clone())
    }

    /// Deliver `message` to every token. Per-token failures are reported in
    /// the result list, not as an error.
    pub async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<DeliveryResult>> {
        let mut request = self.client.post(&self.url).json(&MulticastRequest {
            tokens,
            notification: message,
        });
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|e| PresenceError::HttpError(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PresenceError::PushRelay(format!(
                "relay returned {}",
                status
            )));
        }

        let body: MulticastResponse = response
            .json()
            .await
            .map_err(|e| PresenceError::HttpError(e.without_url()))?;

        if body.responses.len() != tokens.len() {
            return Err(PresenceError::PushRelay(format!(
                "relay answered {} results for {} tokens",
                body.responses.len(),
                tokens.len()
            )));
        }

        Ok(body.responses)
    }
}

/// Loggable form of a delivery token
pub fn redact_token(token: &str) -> String {
    match token.char_indices().nth(TOKEN_LOG_PREFIX) {
        Some((end, _)) => format!("{}…", &token[..end]),
        None => "…".to_string(),
    }
}
