//! Presence tracking core: registry, reconciliation, sessions and liveness.

pub mod heartbeat;
pub mod hub;
pub mod protocol;
pub mod reconciler;
pub mod registry;
pub mod session;
pub mod stats;

pub use heartbeat::{HeartbeatMonitor, HeartbeatTick};
pub use hub::{PresenceHub, UserPresenceView};
pub use protocol::{ClientMessage, ServerMessage};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use registry::{BindOutcome, ConnectionId, ConnectionRegistry, UnbindOutcome};
pub use session::{CloseReason, Session, SessionReply, SessionState};
pub use stats::{PresenceStats, StatsSnapshot};
