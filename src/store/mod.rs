//! Status store abstractions.
//!
//! Presence lives in two stores that are read and written independently:
//! a low-latency ephemeral tree addressed by path, and the durable user
//! record store that holds the canonical profile. Neither offers a
//! transaction spanning both.

pub mod memory;
pub mod rest;
pub mod sqlite;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use memory::{MemoryDurableStore, MemoryEphemeralStore};
pub use rest::RestEphemeralStore;
pub use sqlite::SqliteDurableStore;

/// Root of the ephemeral status tree
pub const STATUS_ROOT: &str = "status";

/// Ephemeral path holding a user's status
pub fn status_path(user_id: &str) -> String {
    format!("{}/{}", STATUS_ROOT, user_id)
}

/// Value stored at `status/{userId}` in the ephemeral store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusValue {
    pub active: bool,
    pub last_seen: i64,
}

/// Durable user record as seen by this server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: String,
    /// `None` until the first presence write lands
    pub active: Option<bool>,
    pub last_seen: Option<i64>,
    #[serde(default)]
    pub tokens: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            active: None,
            last_seen: None,
            tokens: Vec::new(),
            updated_at: None,
        }
    }
}

/// Partial update of a durable record. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub active: Option<bool>,
    pub last_seen: Option<i64>,
    /// Added to the token set if not already present
    pub add_token: Option<String>,
}

impl UserUpdate {
    pub fn presence(active: bool, last_seen: i64) -> Self {
        Self {
            active: Some(active),
            last_seen: Some(last_seen),
            add_token: None,
        }
    }

    pub fn last_seen(last_seen: i64) -> Self {
        Self {
            last_seen: Some(last_seen),
            ..Self::default()
        }
    }

    pub fn token(token: impl Into<String>) -> Self {
        Self {
            add_token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Apply this update to an in-memory record
    pub fn apply_to(&self, record: &mut UserRecord) {
        if let Some(active) = self.active {
            record.active = Some(active);
        }
        if let Some(last_seen) = self.last_seen {
            record.last_seen = Some(last_seen);
        }
        if let Some(token) = &self.add_token {
            if !record.tokens.iter().any(|t| t == token) {
                record.tokens.push(token.clone());
            }
        }
        record.updated_at = Some(Utc::now());
    }
}

/// Low-latency key/value tree used for immediate presence lookups.
pub trait EphemeralStore: Send + Sync + 'static {
    fn read(&self, path: &str) -> impl Future<Output = Result<Option<StatusValue>>> + Send;

    fn write(&self, path: &str, value: StatusValue) -> impl Future<Output = Result<()>> + Send;

    /// Verify the store is reachable
    fn check(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Durable user-record store. Records are created elsewhere; this server only
/// reads and partially updates them.
pub trait DurableStore: Send + Sync + 'static {
    fn get(&self, user_id: &str) -> impl Future<Output = Result<Option<UserRecord>>> + Send;

    /// Fails with `UserNotFound` when no record exists
    fn update(&self, user_id: &str, update: UserUpdate)
        -> impl Future<Output = Result<()>> + Send;

    /// Verify the store is reachable
    fn check(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Ephemeral backend selected at start-up
pub enum EphemeralBackend {
    Memory(MemoryEphemeralStore),
    Rest(RestEphemeralStore),
}

impl EphemeralStore for EphemeralBackend {
    async fn read(&self, path: &str) -> Result<Option<StatusValue>> {
        match self {
            EphemeralBackend::Memory(store) => store.read(path).await,
            EphemeralBackend::Rest(store) => store.read(path).await,
        }
    }

    async fn write(&self, path: &str, value: StatusValue) -> Result<()> {
        match self {
            EphemeralBackend::Memory(store) => store.write(path, value).await,
            EphemeralBackend::Rest(store) => store.write(path, value).await,
        }
    }

    async fn check(&self) -> Result<()> {
        match self {
            EphemeralBackend::Memory(store) => store.check().await,
            EphemeralBackend::Rest(store) => store.check().await,
        }
    }
}

/// Durable backend selected at start-up
pub enum DurableBackend {
    Memory(MemoryDurableStore),
    Sqlite(SqliteDurableStore),
}

impl DurableStore for DurableBackend {
    async fn get(&self, user_id: &str) -> Result<Option<UserRecord>> {
        match self {
            DurableBackend::Memory(store) => store.get(user_id).await,
            DurableBackend::Sqlite(store) => store.get(user_id).await,
        }
    }

    async fn update(&self, user_id: &str, update: UserUpdate) -> Result<()> {
        match self {
            DurableBackend::Memory(store) => store.update(user_id, update).await,
            DurableBackend::Sqlite(store) => store.update(user_id, update).await,
        }
    }

    async fn check(&self) -> Result<()> {
        match self {
            DurableBackend::Memory(store) => store.check().await,
            DurableBackend::Sqlite(store) => store.check().await,
        }
    }
}
