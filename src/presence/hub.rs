//! Process-scoped presence state.
//!
//! The hub owns the connection registry and one reconciliation lane per user.
//! A lane is an unbounded queue drained by a single worker task, so every
//! store read/write for a given user happens strictly in the order the
//! registry saw the events. Different users' lanes run in parallel.
//!
//! Commands are enqueued while the hub lock is held, and a lane retires only
//! after observing (under the same lock) an empty queue and no remaining
//! connection. Two lanes for one user therefore never coexist.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::sync::{oneshot, Mutex};

use super::reconciler::{ReconcileOutcome, Reconciler};
use super::registry::{BindOutcome, ConnectionId, ConnectionRegistry, UnbindOutcome};
use super::stats::{PresenceStats, StatsSnapshot};
use crate::error::{PresenceError, Result};
use crate::store::{DurableStore, EphemeralStore};

enum LaneCommand {
    Online {
        last_seen: i64,
        reply: oneshot::Sender<Result<ReconcileOutcome>>,
    },
    Offline,
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct HubState {
    registry: ConnectionRegistry,
    lanes: HashMap<String, UnboundedSender<LaneCommand>>,
    /// Set by `disconnect_all`; no new bindings after that
    closed: bool,
}

struct HubInner<E, D> {
    reconciler: Reconciler<E, D>,
    state: Mutex<HubState>,
    next_connection: AtomicU64,
}

pub struct PresenceHub<E, D> {
    inner: Arc<HubInner<E, D>>,
}

impl<E, D> Clone for PresenceHub<E, D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Registry view of one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPresenceView {
    pub user_id: String,
    pub online: bool,
    pub connections: usize,
}

impl<E: EphemeralStore, D: DurableStore> PresenceHub<E, D> {
    pub fn new(ephemeral: Arc<E>, durable: Arc<D>) -> Self {
        let stats = Arc::new(PresenceStats::default());
        Self {
            inner: Arc::new(HubInner {
                reconciler: Reconciler::new(ephemeral, durable, stats),
                state: Mutex::new(HubState::default()),
                next_connection: AtomicU64::new(1),
            }),
        }
    }

    pub fn reconciler(&self) -> &Reconciler<E, D> {
        &self.inner.reconciler
    }

    pub fn durable(&self) -> &Arc<D> {
        self.inner.reconciler.durable()
    }

    pub fn stats(&self) -> &Arc<PresenceStats> {
        self.inner.reconciler.stats()
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats().snapshot()
    }

    /// Allocate an id for a freshly accepted connection
    pub fn open_connection(&self) -> ConnectionId {
        ConnectionId(self.inner.next_connection.fetch_add(1, Ordering::Relaxed))
    }

    /// Bind `connection_id` to `user_id` and run the go-online transition.
    ///
    /// The returned outcome is that of the user's lane processing this event;
    /// the registry binding stands even if reconciliation failed. Refused
    /// with `ShuttingDown` once `disconnect_all` has started.
    pub async fn bind(
        &self,
        connection_id: ConnectionId,
        user_id: &str,
        last_seen: i64,
    ) -> Result<ReconcileOutcome> {
        let reply = {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return Err(PresenceError::ShuttingDown);
            }
            match state.registry.bind(connection_id, user_id) {
                BindOutcome::Conflict => {
                    let bound = state
                        .registry
                        .user_of(connection_id)
                        .unwrap_or_default()
                        .to_string();
                    return Err(PresenceError::IdentityMismatch {
                        bound,
                        requested: user_id.to_string(),
                    });
                },
                BindOutcome::FirstConnection => {
                    tracing::info!(user_id, %connection_id, "User connected");
                },
                BindOutcome::AdditionalConnection { connections } => {
                    tracing::info!(user_id, %connection_id, connections, "Additional connection for user");
                },
                BindOutcome::AlreadyBound => {},
            }
            self.enqueue_online(&mut state, user_id, last_seen)
        };

        Self::await_reply(reply).await
    }

    /// Keep-alive from an already bound connection
    pub async fn keep_alive(
        &self,
        connection_id: ConnectionId,
        last_seen: i64,
    ) -> Result<ReconcileOutcome> {
        let reply = {
            let mut state = self.inner.state.lock().await;
            let user_id = state
                .registry
                .user_of(connection_id)
                .map(str::to_string)
                .ok_or_else(|| {
                    PresenceError::InvalidInput(format!("{} is not bound", connection_id))
                })?;
            self.enqueue_online(&mut state, &user_id, last_seen)
        };

        Self::await_reply(reply).await
    }

    /// Remove a connection. When it was the user's last one, the offline
    /// transition is queued on the user's lane and not awaited.
    pub async fn unbind(&self, connection_id: ConnectionId) -> Option<UnbindOutcome> {
        let mut state = self.inner.state.lock().await;
        let outcome = state.registry.unbind(connection_id)?;

        if outcome.last_connection {
            tracing::info!(user_id = %outcome.user_id, %connection_id, "Last connection closed");
            let lane = self.lane(&mut state, &outcome.user_id);
            // The worker only exits through the retire path, which cannot run
            // while we hold the lock
            let _ = lane.send(LaneCommand::Offline);
        } else {
            tracing::debug!(user_id = %outcome.user_id, %connection_id, "Connection closed; user still online");
        }
        Some(outcome)
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.inner.state.lock().await.registry.is_online(user_id)
    }

    pub async fn user_view(&self, user_id: &str) -> UserPresenceView {
        let state = self.inner.state.lock().await;
        UserPresenceView {
            user_id: user_id.to_string(),
            online: state.registry.is_online(user_id),
            connections: state.registry.connections_of(user_id),
        }
    }

    /// (online users, bound connections)
    pub async fn counts(&self) -> (usize, usize) {
        let state = self.inner.state.lock().await;
        (
            state.registry.online_user_count(),
            state.registry.connection_count(),
        )
    }

    /// Wait until everything queued for `user_id` so far has been applied
    pub async fn flush(&self, user_id: &str) {
        let done = {
            let state = self.inner.state.lock().await;
            let Some(lane) = state.lanes.get(user_id) else {
                return;
            };
            let (tx, rx) = oneshot::channel();
            if lane.send(LaneCommand::Flush(tx)).is_err() {
                return;
            }
            rx
        };
        let _ = done.await;
    }

    /// Wait until every lane has drained what was queued so far
    pub async fn settle(&self) {
        let pending: Vec<oneshot::Receiver<()>> = {
            let state = self.inner.state.lock().await;
            state
                .lanes
                .values()
                .filter_map(|lane| {
                    let (tx, rx) = oneshot::channel();
                    lane.send(LaneCommand::Flush(tx)).ok().map(|_| rx)
                })
                .collect()
        };
        for rx in pending {
            let _ = rx.await;
        }
    }

    /// Unbind every connection (process shutdown) and wait for the
    /// resulting offline writes. Later binds are refused.
    pub async fn disconnect_all(&self) {
        let connection_ids: Vec<ConnectionId> = {
            let mut state = self.inner.state.lock().await;
            state.closed = true;
            state
                .registry
                .online_users()
                .iter()
                .flat_map(|user| state.registry.connection_ids_of(user))
                .collect()
        };
        for connection_id in connection_ids {
            self.unbind(connection_id).await;
        }
        self.settle().await;
    }

    fn enqueue_online(
        &self,
        state: &mut HubState,
        user_id: &str,
        last_seen: i64,
    ) -> oneshot::Receiver<Result<ReconcileOutcome>> {
        let (reply, rx) = oneshot::channel();
        let lane = self.lane(state, user_id);
        let _ = lane.send(LaneCommand::Online { last_seen, reply });
        rx
    }

    async fn await_reply(
        reply: oneshot::Receiver<Result<ReconcileOutcome>>,
    ) -> Result<ReconcileOutcome> {
        reply
            .await
            .map_err(|_| PresenceError::Transport("reconciliation lane stopped".to_string()))?
    }

    /// Existing lane for `user_id`, or a freshly spawned one
    fn lane(&self, state: &mut HubState, user_id: &str) -> UnboundedSender<LaneCommand> {
        if let Some(lane) = state.lanes.get(user_id) {
            return lane.clone();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.lanes.insert(user_id.to_string(), tx.clone());
        tokio::spawn(run_lane(self.inner.clone(), user_id.to_string(), rx));
        tracing::trace!(user_id, "Spawned reconciliation lane");
        tx
    }
}

async fn run_lane<E: EphemeralStore, D: DurableStore>(
    inner: Arc<HubInner<E, D>>,
    user_id: String,
    mut rx: UnboundedReceiver<LaneCommand>,
) {
    loop {
        let command = match rx.try_recv() {
            Ok(command) => command,
            Err(TryRecvError::Disconnected) => return,
            Err(TryRecvError::Empty) => {
                let mut state = inner.state.lock().await;
                match rx.try_recv() {
                    Ok(command) => command,
                    Err(TryRecvError::Disconnected) => return,
                    Err(TryRecvError::Empty) => {
                        if !state.registry.is_online(&user_id) {
                            state.lanes.remove(&user_id);
                            tracing::trace!(user_id, "Retired reconciliation lane");
                            return;
                        }
                        drop(state);
                        match rx.recv().await {
                            Some(command) => command,
                            None => return,
                        }
                    },
                }
            },
        };

        apply(&inner.reconciler, &user_id, command).await;
    }
}

async fn apply<E: EphemeralStore, D: DurableStore>(
    reconciler: &Reconciler<E, D>,
    user_id: &str,
    command: LaneCommand,
) {
    match command {
        LaneCommand::Online { last_seen, reply } => {
            let result = reconciler.refresh_online(user_id, last_seen).await;
            if let Err(e) = &result {
                if e.is_degraded_only() {
                    tracing::warn!(user_id, "Online without a durable record: {}", e);
                } else {
                    tracing::warn!(user_id, "Go-online reconciliation failed: {}", e);
                }
            }
            // Receiver may be gone if the session already ended
            let _ = reply.send(result);
        },
        LaneCommand::Offline => match reconciler.go_offline(user_id).await {
            Ok(outcome) => tracing::debug!(user_id, ?outcome, "Offline reconciliation done"),
            Err(e) => tracing::warn!(user_id, "Offline reconciliation failed: {}", e),
        },
        LaneCommand::Flush(done) => {
            let _ = done.send(());
        },
    }
}
