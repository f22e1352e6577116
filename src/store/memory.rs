//! In-process stores.
//!
//! Used as the default backends when no external store is configured, and by
//! the test suite. Both count writes and can be told to fail them, which is
//! how partial-failure paths are exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::RwLock;

use super::{DurableStore, EphemeralStore, StatusValue, UserRecord, UserUpdate};
use crate::error::{PresenceError, Result};

#[derive(Default)]
pub struct MemoryEphemeralStore {
    values: RwLock<HashMap<String, StatusValue>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryEphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes since creation
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent write fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of a path without going through the trait
    pub async fn peek(&self, path: &str) -> Option<StatusValue> {
        self.values.read().await.get(path).copied()
    }
}

impl EphemeralStore for MemoryEphemeralStore {
    async fn read(&self, path: &str) -> Result<Option<StatusValue>> {
        Ok(self.values.read().await.get(path).copied())
    }

    async fn write(&self, path: &str, value: StatusValue) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PresenceError::Transport(format!(
                "memory store refused write to {}",
                path
            )));
        }
        self.values.write().await.insert(path.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn check(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDurableStore {
    records: RwLock<HashMap<String, UserRecord>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with empty records for `user_ids`
    pub fn with_users<I, S>(user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let records = user_ids
            .into_iter()
            .map(|id| {
                let record = UserRecord::new(id);
                (record.user_id.clone(), record)
            })
            .collect();
        Self {
            records: RwLock::new(records),
            ..Self::default()
        }
    }

    /// Provision a user record (replaces any existing one)
    pub async fn insert(&self, record: UserRecord) {
        self.records
            .write()
            .await
            .insert(record.user_id.clone(), record);
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn peek(&self, user_id: &str) -> Option<UserRecord> {
        self.records.read().await.get(user_id).cloned()
    }
}

impl DurableStore for MemoryDurableStore {
    async fn get(&self, user_id: &str) -> Result<Option<UserRecord>> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn update(&self, user_id: &str, update: UserUpdate) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PresenceError::Transport(format!(
                "memory store refused update of {}",
                user_id
            )));
        }
        let mut records = self.records.write().await;
        let record = records
            .get_mut(user_id)
            .ok_or_else(|| PresenceError::UserNotFound(user_id.to_string()))?;
        update.apply_to(record);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn check(&self) -> Result<()> {
        Ok(())
    }
}
