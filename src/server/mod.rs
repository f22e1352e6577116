pub mod handlers;
pub mod models;
#[allow(clippy::module_inception)]
pub mod server;
pub mod websocket;

pub use server::{build_state, connect_stores, create_router, serve, AppState, PresenceServer};
