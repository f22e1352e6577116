use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::models::ApiError;
use super::websocket;
use crate::config::{DurableConfig, EphemeralConfig, HeartbeatConfig, ServerConfig};
use crate::error::{PresenceError, StoreKind};
use crate::presence::PresenceHub;
use crate::push::PushRelay;
use crate::store::{
    DurableBackend, DurableStore, EphemeralBackend, EphemeralStore, MemoryDurableStore,
    MemoryEphemeralStore, RestEphemeralStore, SqliteDurableStore,
};

/// Server state shared across handlers and connections
pub struct AppState<E, D> {
    pub hub: PresenceHub<E, D>,
    pub heartbeat: HeartbeatConfig,
    pub push: Option<Arc<PushRelay>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl<E, D> Clone for AppState<E, D> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
            heartbeat: self.heartbeat,
            push: self.push.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<E: EphemeralStore, D: DurableStore> AppState<E, D> {
    pub fn new(hub: PresenceHub<E, D>, heartbeat: HeartbeatConfig, push: Option<PushRelay>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            hub,
            heartbeat,
            push: push.map(Arc::new),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Receiver that flips to `true` when the server starts shutting down
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Ask every open connection to close
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// Presence server instance
pub struct PresenceServer {
    config: ServerConfig,
}

impl PresenceServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Open the stores, bind and serve until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let state = build_state(&self.config).await?;

        let listener = TcpListener::bind(self.config.addr)
            .await
            .with_context(|| format!("Failed to bind to {}", self.config.addr))?;

        tracing::info!("Presence server listening on {}", self.config.addr);
        tracing::info!(
            "Heartbeat every {:?}, timeout after {:?}",
            self.config.heartbeat.interval,
            self.config.heartbeat.timeout()
        );

        serve(listener, state, shutdown).await
    }
}

/// Build the configured stores and verify both are reachable
pub async fn connect_stores(
    config: &ServerConfig,
) -> crate::error::Result<(EphemeralBackend, DurableBackend)> {
    let ephemeral = match &config.ephemeral {
        EphemeralConfig::Memory => EphemeralBackend::Memory(MemoryEphemeralStore::new()),
        EphemeralConfig::Rest {
            base_url,
            auth_token,
        } => EphemeralBackend::Rest(RestEphemeralStore::new(base_url.clone(), auth_token.clone())?),
    };

    let durable = match &config.durable {
        DurableConfig::Memory { seed_users } => {
            DurableBackend::Memory(MemoryDurableStore::with_users(seed_users.iter().cloned()))
        },
        DurableConfig::Sqlite { path } => DurableBackend::Sqlite(SqliteDurableStore::open(path).await?),
    };

    ephemeral
        .check()
        .await
        .map_err(|e| PresenceError::read_failure(StoreKind::Ephemeral, e))?;
    durable
        .check()
        .await
        .map_err(|e| PresenceError::read_failure(StoreKind::Durable, e))?;

    tracing::debug!("Both status stores reachable");
    Ok((ephemeral, durable))
}

pub async fn build_state(
    config: &ServerConfig,
) -> crate::error::Result<AppState<EphemeralBackend, DurableBackend>> {
    let (ephemeral, durable) = connect_stores(config).await?;
    let push = config.push.as_ref().map(PushRelay::from_config).transpose()?;
    if push.is_none() {
        tracing::info!("No push relay configured; /send-notification will answer 503");
    }

    let hub = PresenceHub::new(Arc::new(ephemeral), Arc::new(durable));
    Ok(AppState::new(hub, config.heartbeat, push))
}

/// Serve `state` on `listener`. On shutdown, open connections are told to
/// close and every user still bound is marked offline before returning.
pub async fn serve<E: EphemeralStore, D: DurableStore>(
    listener: TcpListener,
    state: AppState<E, D>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(state.clone());

    let signal_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Shutting down");
            signal_state.begin_shutdown();
        })
        .await
        .context("Server error")?;

    state.hub.disconnect_all().await;
    tracing::info!("All users marked offline");
    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router<E: EphemeralStore, D: DurableStore>(state: AppState<E, D>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health::<E, D>))
        .route("/presence/:user_id", get(handlers::presence::<E, D>));

    Router::new()
        .route("/", get(handlers::root))
        .route("/ws", get(websocket::handle_presence_websocket::<E, D>))
        .route("/store-token", post(handlers::store_token::<E, D>))
        .route("/send-notification", post(handlers::send_notification::<E, D>))
        .nest("/api", api_routes)
        .fallback(not_found_handler)
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new("NOT_FOUND", "Route not found")),
    )
}
