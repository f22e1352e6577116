use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use super::models::*;
use super::server::AppState;
use crate::error::PresenceError;
use crate::push::{redact_token, PushMessage};
use crate::store::{DurableStore, EphemeralStore, UserUpdate};

pub const ROOT_ACK: &str = "Presence server is running";

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ApiError::new(code, message))).into_response()
}

fn internal_error(context: &str, e: &PresenceError) -> Response {
    tracing::error!("{}: {}", context, e);
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        e.to_error_code(),
        format!("{}: {}", context, e),
    )
}

/// Fixed plaintext acknowledgement
pub async fn root() -> &'static str {
    ROOT_ACK
}

pub async fn health<E: EphemeralStore, D: DurableStore>(
    State(state): State<AppState<E, D>>,
) -> impl IntoResponse {
    let (online_users, connections) = state.hub.counts().await;
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        online_users,
        connections,
        stats: state.hub.stats_snapshot(),
    })
}

/// Registry view of one user
pub async fn presence<E: EphemeralStore, D: DurableStore>(
    State(state): State<AppState<E, D>>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let view = state.hub.user_view(&user_id).await;
    Json(PresenceView {
        user_id: view.user_id,
        online: view.online,
        connections: view.connections,
    })
}

/// Add a push delivery token to a user's token set
pub async fn store_token<E: EphemeralStore, D: DurableStore>(
    State(state): State<AppState<E, D>>,
    Json(req): Json<StoreTokenRequest>,
) -> Response {
    let (Some(user_id), Some(token)) = (non_empty(req.user_id), non_empty(req.token)) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            "userId and token are required",
        );
    };

    match state.hub.durable().update(&user_id, UserUpdate::token(token)).await {
        Ok(()) => {
            tracing::info!(%user_id, "Stored delivery token");
            (
                StatusCode::OK,
                Json(ApiAck {
                    success: true,
                    message: "Token stored".to_string(),
                }),
            )
                .into_response()
        },
        Err(PresenceError::UserNotFound(_)) => error_response(
            StatusCode::NOT_FOUND,
            "USER_NOT_FOUND",
            format!("User {} not found", user_id),
        ),
        Err(e) => internal_error("Failed to store token", &e),
    }
}

/// Fan a notification out to every token registered for a user
pub async fn send_notification<E: EphemeralStore, D: DurableStore>(
    State(state): State<AppState<E, D>>,
    Json(req): Json<SendNotificationRequest>,
) -> Response {
    let (Some(user_id), Some(title), Some(body)) = (
        non_empty(req.user_id),
        non_empty(req.title),
        non_empty(req.body),
    ) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            "userId, title and body are required",
        );
    };

    let record = match state.hub.durable().get(&user_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return error_response(
                StatusCode::NOT_FOUND,
                "USER_NOT_FOUND",
                format!("User {} not found", user_id),
            )
        },
        Err(e) => return internal_error("Failed to load user", &e),
    };

    if record.tokens.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "NO_TOKENS",
            format!("User {} has no delivery tokens", user_id),
        );
    }

    let Some(relay) = state.push.as_ref() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "PUSH_UNAVAILABLE",
            "No push relay configured",
        );
    };

    let message = PushMessage { title, body };
    let results = match relay.send_multicast(&record.tokens, &message).await {
        Ok(results) => results,
        Err(e) => return internal_error("Failed to send notification", &e),
    };

    let mut failed = 0;
    for (token, result) in record.tokens.iter().zip(&results) {
        if !result.success {
            failed += 1;
            tracing::warn!(
                %user_id,
                token = %redact_token(token),
                error = result.error.as_deref().unwrap_or("unknown"),
                "Push delivery failed"
            );
        }
    }
    tracing::info!(%user_id, delivered = results.len() - failed, failed, "Notification sent");

    (
        StatusCode::OK,
        Json(SendNotificationResponse {
            success: true,
            delivered: results.len() - failed,
            failed,
        }),
    )
        .into_response()
}
