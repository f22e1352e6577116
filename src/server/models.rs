use serde::{Deserialize, Serialize};

use crate::presence::StatsSnapshot;

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Plain acknowledgement for successful writes
#[derive(Debug, Serialize)]
pub struct ApiAck {
    pub success: bool,
    pub message: String,
}

/// Store delivery token request. Fields are optional so a missing field is
/// answered with our own 400 rather than the extractor's rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreTokenRequest {
    pub user_id: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationRequest {
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationResponse {
    pub success: bool,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub online_users: usize,
    pub connections: usize,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceView {
    pub user_id: String,
    pub online: bool,
    pub connections: usize,
}

/// Treat empty and whitespace-only strings as absent
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_token_request_accepts_partial_body() {
        let req: StoreTokenRequest = serde_json::from_str(r#"{"userId":"u1"}"#).unwrap();
        assert_eq!(req.user_id.as_deref(), Some("u1"));
        assert!(req.token.is_none());
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("a".into())), Some("a".to_string()));
        assert_eq!(non_empty(Some("  ".into())), None);
        assert_eq!(non_empty(None), None);
    }

    #[test]
    fn test_presence_view_is_camel_case() {
        let json = serde_json::to_value(PresenceView {
            user_id: "u1".into(),
            online: true,
            connections: 2,
        })
        .unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["connections"], 2);
    }
}
