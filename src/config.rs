//! Server configuration.
//!
//! Built once from the parsed command line (which itself falls back to
//! environment variables) and validated before any store is opened.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::{Cli, DurableKind, EphemeralKind};
use crate::error::{PresenceError, Result};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_HEARTBEAT_TIMEOUT_FACTOR: u32 = 2;

/// Credential material. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    /// Missed intervals tolerated before the peer is declared dead
    pub timeout_factor: u32,
}

impl HeartbeatConfig {
    pub fn timeout(&self) -> Duration {
        self.interval * self.timeout_factor
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            timeout_factor: DEFAULT_HEARTBEAT_TIMEOUT_FACTOR,
        }
    }
}

#[derive(Debug, Clone)]
pub enum EphemeralConfig {
    Memory,
    Rest {
        base_url: String,
        auth_token: Option<Secret>,
    },
}

#[derive(Debug, Clone)]
pub enum DurableConfig {
    Memory { seed_users: Vec<String> },
    Sqlite { path: PathBuf },
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub relay_url: String,
    pub auth_token: Option<Secret>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub heartbeat: HeartbeatConfig,
    pub ephemeral: EphemeralConfig,
    pub durable: DurableConfig,
    pub push: Option<PushConfig>,
}

impl ServerConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
            .parse()
            .map_err(|e| PresenceError::Config(format!("Invalid listen address: {}", e)))?;

        if cli.heartbeat_interval_ms == 0 {
            return Err(PresenceError::Config(
                "Heartbeat interval must be greater than zero".to_string(),
            ));
        }
        if cli.heartbeat_timeout_factor == 0 {
            return Err(PresenceError::Config(
                "Heartbeat timeout factor must be at least 1".to_string(),
            ));
        }

        let ephemeral = match cli.ephemeral {
            EphemeralKind::Memory => EphemeralConfig::Memory,
            EphemeralKind::Rest => {
                let base_url = cli.ephemeral_url.clone().ok_or_else(|| {
                    PresenceError::Config(
                        "--ephemeral rest requires --ephemeral-url".to_string(),
                    )
                })?;
                EphemeralConfig::Rest {
                    base_url,
                    auth_token: cli.ephemeral_token.clone().map(Secret::new),
                }
            },
        };

        let durable = match cli.durable {
            DurableKind::Memory => DurableConfig::Memory {
                seed_users: cli.seed_users.clone(),
            },
            DurableKind::Sqlite => {
                let path = cli.database.clone().ok_or_else(|| {
                    PresenceError::Config("--durable sqlite requires --database".to_string())
                })?;
                DurableConfig::Sqlite { path }
            },
        };

        let push = cli.push_relay_url.clone().map(|relay_url| PushConfig {
            relay_url,
            auth_token: cli.push_relay_token.clone().map(Secret::new),
        });

        Ok(Self {
            addr,
            heartbeat: HeartbeatConfig {
                interval: Duration::from_millis(cli.heartbeat_interval_ms),
                timeout_factor: cli.heartbeat_timeout_factor,
            },
            ephemeral,
            durable,
            push,
        })
    }
}
