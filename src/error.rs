use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Which of the two status stores an operation touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Ephemeral,
    Durable,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Ephemeral => write!(f, "ephemeral"),
            StoreKind::Durable => write!(f, "durable"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PresenceError {
    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("{store} store write failed: {reason}")]
    StoreWrite { store: StoreKind, reason: String },

    #[error("{store} store read failed: {reason}")]
    StoreRead { store: StoreKind, reason: String },

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Connection already bound to {bound}, refusing {requested}")]
    IdentityMismatch { bound: String, requested: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server is shutting down")]
    ShuttingDown,

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Push relay error: {0}")]
    PushRelay(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl PresenceError {
    pub fn to_error_code(&self) -> &'static str {
        match self {
            PresenceError::UnknownUser(_) => "UNKNOWN_USER",
            PresenceError::StoreWrite { .. } => "STORE_WRITE_FAILURE",
            PresenceError::StoreRead { .. } => "STORE_READ_FAILURE",
            PresenceError::MalformedMessage(_) => "MALFORMED_MESSAGE",
            PresenceError::IdentityMismatch { .. } => "IDENTITY_MISMATCH",
            PresenceError::Transport(_) => "TRANSPORT_ERROR",
            PresenceError::ShuttingDown => "SHUTTING_DOWN",
            PresenceError::UserNotFound(_) => "USER_NOT_FOUND",
            PresenceError::InvalidInput(_) => "INVALID_INPUT",
            PresenceError::Config(_) => "CONFIG_ERROR",
            PresenceError::PushRelay(_) => "PUSH_RELAY_ERROR",
            PresenceError::DatabaseError(_) => "DATABASE_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.to_error_code().to_string(),
        }
    }

    /// Wrap a store-level failure as a write failure on `store`
    pub fn write_failure(store: StoreKind, err: PresenceError) -> Self {
        PresenceError::StoreWrite {
            store,
            reason: err.to_string(),
        }
    }

    /// Wrap a store-level failure as a read failure on `store`
    pub fn read_failure(store: StoreKind, err: PresenceError) -> Self {
        PresenceError::StoreRead {
            store,
            reason: err.to_string(),
        }
    }

    /// True for conditions that leave the session usable
    pub fn is_degraded_only(&self) -> bool {
        matches!(self, PresenceError::UnknownUser(_))
    }
}

pub type Result<T> = std::result::Result<T, PresenceError>;
