// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fencing daemon (fenced)
//!
//! Background process that owns the fencer and serves local clients and peers.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod lifecycle;
mod server;

use std::path::PathBuf;

use fenced_daemon::config::DaemonConfig;
use fenced_engine::RuntimeEvent;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use crate::lifecycle::{LifecycleError, CONFIG_POLL_INTERVAL};
use crate::server::ServerContext;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional path of fenced.toml
    let args: Vec<String> = std::env::args().collect();
    let config = match args.get(1) {
        Some(path) => DaemonConfig::from_file(&PathBuf::from(path))?,
        None => DaemonConfig::load()?,
    };

    // Write startup marker to log (before tracing setup, so CLI can find it)
    write_startup_marker(&config)?;

    let log_guard = setup_logging(&config)?;

    info!(node = %config.node_name, "Starting fenced");

    let mut daemon = match lifecycle::startup(&config).await {
        Ok(d) => d,
        Err(e) => {
            // Write error synchronously (tracing is non-blocking and may not flush in time)
            write_startup_error(&config, &e);
            error!("Failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    if let Some(listener) = daemon.peer_listener.take() {
        tokio::spawn(lifecycle::serve_peers(listener, daemon.events_tx.clone()));
    }
    let ctx = ServerContext::new(
        daemon.core.clone(),
        &daemon.config,
        daemon.uid,
        daemon.shutdown.clone(),
    );
    let mut config_poll = tokio::time::interval_at(
        tokio::time::Instant::now() + CONFIG_POLL_INTERVAL,
        CONFIG_POLL_INTERVAL,
    );

    info!(
        "Daemon ready, listening on {}",
        config.socket_path.display()
    );

    // Signal ready for parent process (e.g., systemd, CLI waiting for startup)
    println!("READY");

    loop {
        let next_timer = daemon.core.next_deadline();
        let timer = async move {
            match next_timer {
                Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            // Each client gets its own task; a blocking fence holds its
            // connection until the operation ends
            result = daemon.listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server::handle_connection(ctx, stream).await {
                                error!("Error handling connection: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                }
            }

            // Agent completions and peer traffic
            Some(event) = daemon.events.recv() => {
                daemon.core.handle(event).await;
            }

            Some(peer) = daemon.peer_failures.recv() => {
                daemon.core.handle(RuntimeEvent::PeerFailed { peer }).await;
            }

            _ = timer => {
                daemon.core.fire_timers().await;
            }

            _ = config_poll.tick() => {
                daemon.reload_config().await;
            }

            _ = daemon.shutdown.notified() => {
                info!("Shutdown requested via IPC, shutting down...");
                break;
            }

            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                break;
            }

            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
                break;
            }
        }
    }

    daemon.shutdown().await?;
    info!("Daemon stopped");
    Ok(())
}

/// Startup marker prefix written to log before anything else.
/// CLI uses this to find where the current startup attempt begins.
/// Full format: "--- fenced: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- fenced: starting (pid: ";

/// Write startup marker to log file (appends to existing log)
fn write_startup_marker(config: &DaemonConfig) -> Result<(), LifecycleError> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

/// Write startup error synchronously to log file.
/// This ensures the error is visible to the CLI even if the process exits quickly.
fn write_startup_error(config: &DaemonConfig, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start daemon: {}", error);
}

fn setup_logging(
    config: &DaemonConfig,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let (dir, file) = match (config.log_path.parent(), config.log_path.file_name()) {
        (Some(dir), Some(file)) => (dir, file),
        _ => {
            return Err(LifecycleError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("bad log path {}", config.log_path.display()),
            )))
        }
    };
    std::fs::create_dir_all(dir)?;

    let file_appender = tracing_appender::rolling::never(dir, file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
