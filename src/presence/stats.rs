use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide presence counters, exposed on `/api/health`
#[derive(Debug, Default)]
pub struct PresenceStats {
    reconciliations: AtomicU64,
    settled: AtomicU64,
    keep_alives: AtomicU64,
    store_writes: AtomicU64,
    store_failures: AtomicU64,
    unknown_users: AtomicU64,
    malformed_messages: AtomicU64,
    heartbeat_timeouts: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub reconciliations: u64,
    pub settled: u64,
    pub keep_alives: u64,
    pub store_writes: u64,
    pub store_failures: u64,
    pub unknown_users: u64,
    pub malformed_messages: u64,
    pub heartbeat_timeouts: u64,
}

impl PresenceStats {
    pub fn record_reconciliation(&self) {
        self.reconciliations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_settled(&self) {
        self.settled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_keep_alive(&self) {
        self.keep_alives.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_write(&self) {
        self.store_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_user(&self) {
        self.unknown_users.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_message(&self) {
        self.malformed_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_heartbeat_timeout(&self) {
        self.heartbeat_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reconciliations: self.reconciliations.load(Ordering::Relaxed),
            settled: self.settled.load(Ordering::Relaxed),
            keep_alives: self.keep_alives.load(Ordering::Relaxed),
            store_writes: self.store_writes.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            unknown_users: self.unknown_users.load(Ordering::Relaxed),
            malformed_messages: self.malformed_messages.load(Ordering::Relaxed),
            heartbeat_timeouts: self.heartbeat_timeouts.load(Ordering::Relaxed),
        }
    }
}
