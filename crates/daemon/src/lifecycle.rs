// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, configuration reloads, shutdown.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fenced_adapters::peer::wire::read_envelope;
use fenced_adapters::{
    CommandNotifyAdapter, LogNotifyAdapter, NotifyAdapter, NotifyError, ProcessAgentAdapter,
    TcpPeerAdapter, TracedAgentAdapter, TracedPeerAdapter,
};
use fenced_config::{load_model, ConfigEvaluator, SchedulerEvaluator, SchedulerPass};
use fenced_core::{RegistryConfig, SystemClock, UuidIdGen};
use fenced_daemon::config::DaemonConfig;
use fenced_engine::{FencerCore, RuntimeConfig, RuntimeDeps, RuntimeEvent};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream, UnixListener};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

/// Daemon runtime with concrete adapter types (wrapped with tracing)
pub type DaemonRuntime = FencerCore<
    TracedAgentAdapter<ProcessAgentAdapter>,
    TracedPeerAdapter<TcpPeerAdapter>,
    Notifier,
    SystemClock,
    UuidIdGen,
>;

/// How often the cluster configuration is checked for changes
pub const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Notification sink picked by `notify_command`
#[derive(Clone, Debug)]
pub enum Notifier {
    Log(LogNotifyAdapter),
    Command(CommandNotifyAdapter),
}

impl Notifier {
    pub fn from_config(config: &DaemonConfig) -> Self {
        match &config.notify_command {
            Some(command) => Notifier::Command(CommandNotifyAdapter::new(command.clone())),
            None => Notifier::Log(LogNotifyAdapter::new()),
        }
    }
}

#[async_trait]
impl NotifyAdapter for Notifier {
    async fn send(&self, channel: &str, message: &str) -> Result<(), NotifyError> {
        match self {
            Notifier::Log(inner) => inner.send(channel, message).await,
            Notifier::Command(inner) => inner.send(channel, message).await,
        }
    }
}

/// Re-reads the cluster configuration when its content changes
pub struct ConfigWatcher {
    path: PathBuf,
    evaluator: ConfigEvaluator,
    digest: Option<[u8; 32]>,
}

impl ConfigWatcher {
    pub fn new(path: PathBuf, evaluator: ConfigEvaluator) -> Self {
        Self {
            path,
            evaluator,
            digest: None,
        }
    }

    /// A scheduler pass when the document changed since the last call.
    /// A document that fails to parse keeps the previous pass in force.
    pub fn poll(&mut self) -> Result<Option<SchedulerPass>, LifecycleError> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| LifecycleError::ClusterConfig(self.path.clone(), e.to_string()))?;
        let digest: [u8; 32] = Sha256::digest(content.as_bytes()).into();
        if self.digest == Some(digest) {
            return Ok(None);
        }
        self.digest = Some(digest);
        let model = load_model(&content)
            .map_err(|e| LifecycleError::ClusterConfig(self.path.clone(), e.to_string()))?;
        Ok(Some(self.evaluator.evaluate(&model)))
    }
}

/// Daemon state during operation
pub struct DaemonState {
    pub config: DaemonConfig,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    /// Unix socket listener
    pub listener: UnixListener,
    /// Peer listener; handed to [`serve_peers`] once the loop runs
    pub peer_listener: Option<TcpListener>,
    pub core: Arc<DaemonRuntime>,
    /// Agent completions and peer traffic
    pub events: mpsc::Receiver<RuntimeEvent>,
    pub events_tx: mpsc::Sender<RuntimeEvent>,
    /// Peers the transport failed to reach
    pub peer_failures: mpsc::Receiver<String>,
    pub watcher: Option<ConfigWatcher>,
    /// When daemon started
    pub start_time: Instant,
    /// Uid the daemon runs as
    pub uid: u32,
    /// Notified by a `shutdown` request
    pub shutdown: Arc<Notify>,
}

impl DaemonState {
    /// Apply the cluster configuration if it changed
    pub async fn reload_config(&mut self) {
        let Some(watcher) = self.watcher.as_mut() else {
            return;
        };
        match watcher.poll() {
            Ok(Some(pass)) => {
                let delta = self.core.apply_config(pass).await;
                info!(
                    added = delta.added.len(),
                    removed = delta.removed.len(),
                    rejected = delta.rejected.len(),
                    levels = delta.levels,
                    "cluster configuration applied"
                );
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "cluster configuration not applied"),
        }
    }

    /// Shutdown the daemon gracefully
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("Shutting down daemon...");

        for path in [
            &self.config.socket_path,
            &self.config.lock_path,
            &self.config.version_path,
        ] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "failed to remove file");
                }
            }
        }

        info!("Daemon shutdown complete");
        Ok(())
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("Failed to bind peer listener on {0}: {1}")]
    PeerBindFailed(String, std::io::Error),

    #[error("Cluster configuration {0}: {1}")]
    ClusterConfig(PathBuf, String),

    #[error("Configuration error: {0}")]
    Config(#[from] fenced_daemon::config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Runtime error: {0}")]
    Runtime(#[from] fenced_engine::RuntimeError),
}

/// Start the daemon
pub async fn startup(config: &DaemonConfig) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config).await {
        Ok(state) => Ok(state),
        // Another daemon owns these files
        Err(e @ LifecycleError::LockFailed(_)) => Err(e),
        Err(e) => {
            // Clean up any resources created before failure
            cleanup_on_failure(config);
            Err(e)
        }
    }
}

/// Inner startup logic - cleanup_on_failure called if this fails
async fn startup_inner(config: &DaemonConfig) -> Result<DaemonState, LifecycleError> {
    for path in [&config.socket_path, &config.lock_path] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Acquire lock file FIRST - prevents races
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;

    use std::io::Write;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    std::fs::write(&config.version_path, env!("CARGO_PKG_VERSION"))?;

    // Read the cluster configuration before accepting anything
    let mut watcher = config.cluster_config.as_ref().map(|path| {
        ConfigWatcher::new(
            path.clone(),
            ConfigEvaluator::new(config.node_name.clone())
                .with_sbd_watchdog_timeout(ConfigEvaluator::sbd_timeout_from_env()),
        )
    });
    let initial_pass = match watcher.as_mut() {
        Some(w) => w.poll()?,
        None => None,
    };

    let peer_listener = match &config.peer_listen {
        Some(addr) => Some(
            TcpListener::bind(addr)
                .await
                .map_err(|e| LifecycleError::PeerBindFailed(addr.clone(), e))?,
        ),
        None => None,
    };

    let (events_tx, events) = mpsc::channel(256);
    let (failures_tx, peer_failures) = mpsc::channel(64);

    let agents = TracedAgentAdapter::new(ProcessAgentAdapter::new(config.agent_dir.clone()));
    let peers = TracedPeerAdapter::new(TcpPeerAdapter::start(
        config.node_name.clone(),
        &config.peers,
        failures_tx,
    ));

    let core = FencerCore::new(
        RuntimeDeps {
            agents,
            peers,
            notify: Notifier::from_config(config),
            events: events_tx.clone(),
        },
        RuntimeConfig {
            node: config.node_name.clone(),
            registry: RegistryConfig {
                default_timeout: config.default_timeout,
                probe_ttl: config.probe_ttl,
                ..RegistryConfig::default()
            },
            gossip_interval: config.gossip_interval,
            history_cap: config.history_cap,
        },
        SystemClock,
        UuidIdGen,
    );
    if let Some(pass) = initial_pass {
        let delta = core.apply_config(pass).await;
        info!(
            devices = delta.added.len(),
            rejected = delta.rejected.len(),
            levels = delta.levels,
            "cluster configuration loaded"
        );
    }
    core.start().await?;

    // Remove stale socket and bind (LAST - only after all validation passes)
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    info!(
        node = %config.node_name,
        peers = config.peers.len(),
        "Daemon started"
    );

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        listener,
        peer_listener,
        core: Arc::new(core),
        events,
        events_tx,
        peer_failures,
        watcher,
        start_time: Instant::now(),
        uid: nix::unistd::getuid().as_raw(),
        shutdown: Arc::new(Notify::new()),
    })
}

/// Clean up resources on startup failure
fn cleanup_on_failure(config: &DaemonConfig) {
    for path in [
        &config.socket_path,
        &config.version_path,
        &config.lock_path,
    ] {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Accept peer connections and feed their messages into the event loop
pub async fn serve_peers(listener: TcpListener, events: mpsc::Sender<RuntimeEvent>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!(%addr, "peer connected");
                tokio::spawn(read_peer(stream, events.clone()));
            }
            Err(e) => warn!(error = %e, "peer accept failed"),
        }
    }
}

async fn read_peer(mut stream: TcpStream, events: mpsc::Sender<RuntimeEvent>) {
    loop {
        match read_envelope(&mut stream).await {
            Ok(Some(envelope)) => {
                let event = RuntimeEvent::Peer {
                    from: envelope.from,
                    message: envelope.message,
                };
                if events.send(event).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "peer stream closed");
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
