use clap::Parser;
use presence_sync::cli::Cli;
use presence_sync::config::ServerConfig;
use presence_sync::error::{ErrorResponse, PresenceError};
use presence_sync::logging::{cleanup_old_logs, default_log_dir, init_logging, LoggingConfig};
use presence_sync::server::PresenceServer;
use std::path::{Path, PathBuf};

/// Rotated log files older than this are removed at start-up
const DEFAULT_LOG_RETENTION_DAYS: u32 = 7;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut log_config = LoggingConfig::from_args(cli.quiet, cli.verbose, cli.json);
    let log_file = cli.log_file.as_deref().map(resolve_log_file);
    if let Some(path) = &log_file {
        log_config = log_config.with_file(path.clone());
    }

    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if let Some(dir) = log_file.as_deref().and_then(Path::parent) {
        let retention_days = std::env::var("PRESENCE_LOG_RETENTION_DAYS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_LOG_RETENTION_DAYS);
        cleanup_old_logs(dir, retention_days).ok();
    }

    if let Err(e) = run(&cli).await {
        let error_response = match e.downcast_ref::<PresenceError>() {
            Some(err) => err.to_error_response(),
            None => ErrorResponse {
                error: format!("{:#}", e),
                code: "SERVER_ERROR".to_string(),
            },
        };
        tracing::error!("{}", error_response.error);
        match serde_json::to_string_pretty(&error_response) {
            Ok(json) => eprintln!("{}", json),
            Err(_) => eprintln!("{}", error_response.error),
        }
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = ServerConfig::from_cli(cli)?;
    PresenceServer::new(config).run(shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

/// A bare file name goes under the default log directory
fn resolve_log_file(path: &Path) -> PathBuf {
    let has_dir = path
        .parent()
        .is_some_and(|parent| !parent.as_os_str().is_empty());
    if has_dir {
        return path.to_path_buf();
    }
    match default_log_dir() {
        Some(dir) => {
            if let Err(e) = std::fs::create_dir_all(&dir) {
                eprintln!("Failed to create log directory {}: {}", dir.display(), e);
            }
            dir.join(path)
        },
        None => PathBuf::from(".").join(path),
    }
}
