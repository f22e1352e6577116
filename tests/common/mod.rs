//! Common utilities for integration tests
//!
//! Starts a real server on an ephemeral port, backed by in-memory stores the
//! test can inspect directly.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use presence_sync::config::HeartbeatConfig;
use presence_sync::presence::PresenceHub;
use presence_sync::push::PushRelay;
use presence_sync::server::{serve, AppState};
use presence_sync::store::{MemoryDurableStore, MemoryEphemeralStore};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub type TestHub = PresenceHub<MemoryEphemeralStore, MemoryDurableStore>;

/// Path to the `presence-server` binary built for this test run
pub fn server_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_presence-server"))
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub ephemeral: Arc<MemoryEphemeralStore>,
    pub durable: Arc<MemoryDurableStore>,
    pub hub: TestHub,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestServer {
    pub async fn start(users: &[&str]) -> Self {
        Self::start_with(users, HeartbeatConfig::default(), None).await
    }

    pub async fn start_with(
        users: &[&str],
        heartbeat: HeartbeatConfig,
        push: Option<PushRelay>,
    ) -> Self {
        let ephemeral = Arc::new(MemoryEphemeralStore::new());
        let durable = Arc::new(MemoryDurableStore::with_users(users.iter().copied()));
        let hub = PresenceHub::new(ephemeral.clone(), durable.clone());
        let state = AppState::new(hub.clone(), heartbeat, push);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(serve(listener, state, async move {
            let _ = stopped.await;
        }));

        Self {
            addr,
            ephemeral,
            durable,
            hub,
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger graceful shutdown and wait for the server to return
    pub async fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(Duration::from_secs(10), handle)
                .await
                .expect("server did not stop")
                .expect("server task panicked")
                .expect("server returned an error");
        }
    }
}

/// Poll `check` until it holds or five seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
