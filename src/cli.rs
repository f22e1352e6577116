use clap::{Parser, ValueEnum};
use std::path::PathBuf;

const LONG_ABOUT: &str = r#"
Presence Sync - realtime online/offline tracking

Clients hold a WebSocket open on /ws and announce themselves with
  {"userId": "...", "isOnline": true, "lastSeen": 1700000000000}

The server mirrors each user's presence into two stores:
  • an ephemeral status tree (status/{userId}) for instant lookups
  • the durable user record store (canonical profile)

and keeps them in agreement as connections come and go.

HTTP routes:
  GET  /                     health acknowledgement
  GET  /api/health           counters and connection totals
  GET  /api/presence/{id}    registry view of one user
  POST /store-token          register a push delivery token
  POST /send-notification    fan a push message out to a user's tokens
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EphemeralKind {
    /// In-process map (state is lost on restart)
    Memory,
    /// Realtime-database style REST tree
    Rest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DurableKind {
    /// In-process map seeded from --seed-user
    Memory,
    /// SQLite database file
    Sqlite,
}

#[derive(Parser, Clone, Debug)]
#[command(name = "presence-server")]
#[command(about = "WebSocket presence server keeping an ephemeral and a durable store in sync")]
#[command(long_about = LONG_ABOUT)]
#[command(version)]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = crate::config::DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind
    #[arg(long, env = "PRESENCE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Interval between protocol pings, in milliseconds
    #[arg(
        long,
        env = "PRESENCE_HEARTBEAT_MS",
        default_value_t = crate::config::DEFAULT_HEARTBEAT_INTERVAL_MS
    )]
    pub heartbeat_interval_ms: u64,

    /// Missed heartbeat intervals before a connection is considered dead
    #[arg(
        long,
        env = "PRESENCE_HEARTBEAT_FACTOR",
        default_value_t = crate::config::DEFAULT_HEARTBEAT_TIMEOUT_FACTOR
    )]
    pub heartbeat_timeout_factor: u32,

    /// Ephemeral status store backend
    #[arg(long, env = "PRESENCE_EPHEMERAL", value_enum, default_value = "memory")]
    pub ephemeral: EphemeralKind,

    /// Base URL of the REST status tree
    #[arg(long, env = "PRESENCE_EPHEMERAL_URL")]
    pub ephemeral_url: Option<String>,

    /// Auth token for the REST status tree
    #[arg(long, env = "PRESENCE_EPHEMERAL_TOKEN", hide_env_values = true)]
    pub ephemeral_token: Option<String>,

    /// Durable user record store backend
    #[arg(long, env = "PRESENCE_DURABLE", value_enum, default_value = "memory")]
    pub durable: DurableKind,

    /// SQLite database path for the durable store
    #[arg(long, env = "PRESENCE_DATABASE")]
    pub database: Option<PathBuf>,

    /// Provision a user in the in-memory durable store (repeatable)
    #[arg(long = "seed-user", value_name = "USER_ID")]
    pub seed_users: Vec<String>,

    /// Push relay endpoint used by /send-notification
    #[arg(long, env = "PRESENCE_PUSH_RELAY_URL")]
    pub push_relay_url: Option<String>,

    /// Bearer token for the push relay
    #[arg(long, env = "PRESENCE_PUSH_RELAY_TOKEN", hide_env_values = true)]
    pub push_relay_token: Option<String>,

    /// Enable verbose output (-v)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output (-q)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output logs in JSON format
    #[arg(long)]
    pub json: bool,

    /// Write logs to this file instead of stdout
    #[arg(long, env = "PRESENCE_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_backends() {
        let cli = Cli::try_parse_from([
            "presence-server",
            "--durable",
            "sqlite",
            "--database",
            "/tmp/users.db",
            "--seed-user",
            "a",
            "--seed-user",
            "b",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.durable, DurableKind::Sqlite);
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/users.db")));
        assert_eq!(cli.seed_users, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Cli::try_parse_from(["presence-server", "--ephemeral", "redis"]).is_err());
    }
}
