//! Dual-store status reconciliation.
//!
//! Compares the desired presence of a user against what each store holds and
//! issues only the writes that are missing. The two stores are never updated
//! transactionally: a write that lands is kept even if its sibling fails, and
//! the next reconciliation for the user converges them.

use std::sync::Arc;

use super::stats::PresenceStats;
use crate::error::{PresenceError, Result, StoreKind};
use crate::store::{status_path, DurableStore, EphemeralStore, StatusValue, UserRecord, UserUpdate};
use crate::time_utils::{millis_to_datetime, now_millis};

/// What a reconciliation ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Both stores already matched; nothing written
    Settled,
    /// Corrective writes were issued
    Applied { ephemeral: bool, durable: bool },
    /// User already online in both stores; only durable `lastSeen` considered
    KeepAlive { written: bool },
}

impl ReconcileOutcome {
    pub fn wrote_anything(&self) -> bool {
        match self {
            ReconcileOutcome::Settled => false,
            ReconcileOutcome::Applied { ephemeral, durable } => *ephemeral || *durable,
            ReconcileOutcome::KeepAlive { written } => *written,
        }
    }
}

pub struct Reconciler<E, D> {
    ephemeral: Arc<E>,
    durable: Arc<D>,
    stats: Arc<PresenceStats>,
}

impl<E, D> Clone for Reconciler<E, D> {
    fn clone(&self) -> Self {
        Self {
            ephemeral: self.ephemeral.clone(),
            durable: self.durable.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<E: EphemeralStore, D: DurableStore> Reconciler<E, D> {
    pub fn new(ephemeral: Arc<E>, durable: Arc<D>, stats: Arc<PresenceStats>) -> Self {
        Self {
            ephemeral,
            durable,
            stats,
        }
    }

    pub fn ephemeral(&self) -> &Arc<E> {
        &self.ephemeral
    }

    pub fn durable(&self) -> &Arc<D> {
        &self.durable
    }

    pub fn stats(&self) -> &Arc<PresenceStats> {
        &self.stats
    }

    async fn read_both(&self, user_id: &str) -> Result<(Option<StatusValue>, Option<UserRecord>)> {
        let path = status_path(user_id);
        let (ephemeral, durable) =
            tokio::join!(self.ephemeral.read(&path), self.durable.get(user_id));

        let ephemeral =
            ephemeral.map_err(|e| PresenceError::read_failure(StoreKind::Ephemeral, e))?;
        let durable = durable.map_err(|e| PresenceError::read_failure(StoreKind::Durable, e))?;
        Ok((ephemeral, durable))
    }

    /// Bring both stores to `desired_active`, writing only the stale ones.
    ///
    /// Returns `UnknownUser` when the durable record does not exist; the
    /// ephemeral write has still been attempted in that case.
    pub async fn reconcile(
        &self,
        user_id: &str,
        desired_active: bool,
        observed_last_seen: i64,
    ) -> Result<ReconcileOutcome> {
        self.stats.record_reconciliation();
        let (ephemeral, durable) = self.read_both(user_id).await?;

        let needs_ephemeral = ephemeral.is_none_or_differs(desired_active);
        let durable_exists = durable.is_some();
        let needs_durable = match &durable {
            Some(record) => record.active != Some(desired_active),
            None => true,
        };

        if !needs_ephemeral && !needs_durable {
            tracing::debug!(user_id, desired_active, "Presence already settled");
            self.stats.record_settled();
            return Ok(ReconcileOutcome::Settled);
        }

        let write_durable = needs_durable && durable_exists;
        let path = status_path(user_id);
        let value = StatusValue {
            active: desired_active,
            last_seen: observed_last_seen,
        };

        let ephemeral_write = async {
            if needs_ephemeral {
                Some(self.ephemeral.write(&path, value).await)
            } else {
                None
            }
        };
        let durable_write = async {
            if write_durable {
                Some(
                    self.durable
                        .update(user_id, UserUpdate::presence(desired_active, observed_last_seen))
                        .await,
                )
            } else {
                None
            }
        };
        let (ephemeral_result, durable_result) = tokio::join!(ephemeral_write, durable_write);

        let mut failure = None;
        for (store, result) in [
            (StoreKind::Ephemeral, ephemeral_result),
            (StoreKind::Durable, durable_result),
        ] {
            match result {
                Some(Ok(())) => self.stats.record_store_write(),
                Some(Err(err)) => {
                    self.stats.record_store_failure();
                    crate::log_store_failure!(err, user_id, store.to_string());
                    failure.get_or_insert(PresenceError::write_failure(store, err));
                },
                None => {},
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        if needs_durable && !durable_exists {
            self.stats.record_unknown_user();
            tracing::warn!(
                user_id,
                desired_active,
                "No durable record for user; only the ephemeral status was written"
            );
            return Err(PresenceError::UnknownUser(user_id.to_string()));
        }

        crate::log_presence_transition!(
            user_id,
            if desired_active { "online" } else { "offline" },
            format!(
                "ephemeral_written={} durable_written={} last_seen={}",
                needs_ephemeral,
                write_durable,
                millis_to_datetime(observed_last_seen)
                    .map(|dt| dt.to_rfc3339())
                    .unwrap_or_else(|| observed_last_seen.to_string())
            )
        );
        Ok(ReconcileOutcome::Applied {
            ephemeral: needs_ephemeral,
            durable: write_durable,
        })
    }

    /// Handle an "I'm online" signal.
    ///
    /// When both stores already say the user is active this is a keep-alive:
    /// the ephemeral store is left alone and the durable `lastSeen` is moved
    /// forward (never backwards). Any disagreement falls through to a full
    /// `reconcile(user, true, observed_last_seen)`.
    pub async fn refresh_online(
        &self,
        user_id: &str,
        observed_last_seen: i64,
    ) -> Result<ReconcileOutcome> {
        let (ephemeral, durable) = self.read_both(user_id).await?;

        let ephemeral_active = ephemeral.map(|v| v.active).unwrap_or(false);
        let durable_record = match durable {
            Some(record) if ephemeral_active && record.active == Some(true) => record,
            _ => return self.reconcile(user_id, true, observed_last_seen).await,
        };

        self.stats.record_keep_alive();
        if durable_record
            .last_seen
            .is_some_and(|stored| stored >= observed_last_seen)
        {
            tracing::trace!(user_id, observed_last_seen, "Keep-alive carries no newer lastSeen");
            return Ok(ReconcileOutcome::KeepAlive { written: false });
        }

        match self
            .durable
            .update(user_id, UserUpdate::last_seen(observed_last_seen))
            .await
        {
            Ok(()) => {
                self.stats.record_store_write();
                tracing::debug!(user_id, observed_last_seen, "Keep-alive refreshed lastSeen");
                Ok(ReconcileOutcome::KeepAlive { written: true })
            },
            Err(err) => {
                self.stats.record_store_failure();
                crate::log_store_failure!(err, user_id, "keep-alive");
                Err(PresenceError::write_failure(StoreKind::Durable, err))
            },
        }
    }

    /// Mark a user offline using a server-side timestamp
    pub async fn go_offline(&self, user_id: &str) -> Result<ReconcileOutcome> {
        self.reconcile(user_id, false, now_millis()).await
    }
}

trait StatusValueExt {
    fn is_none_or_differs(&self, desired_active: bool) -> bool;
}

impl StatusValueExt for Option<StatusValue> {
    fn is_none_or_differs(&self, desired_active: bool) -> bool {
        self.map(|v| v.active != desired_active).unwrap_or(true)
    }
}
