// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration (`fenced.toml`)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Overrides the configuration file location
pub const CONFIG_ENV: &str = "FENCED_CONFIG";
/// Overrides `socket_path`
pub const SOCKET_ENV: &str = "FENCED_SOCKET_PATH";

/// Peers may not gossip less often than this
pub const MAX_GOSSIP_INTERVAL: Duration = Duration::from_secs(30);

pub const DEFAULT_CONFIG_PATH: &str = "/etc/fenced/fenced.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("gossip_interval must be between 1s and 30s, got {0:?}")]
    GossipInterval(Duration),

    #[error("history_cap must be positive")]
    HistoryCap,

    #[error("could not determine the node name")]
    NodeName,

    #[error("could not determine the state directory")]
    NoStateDir,
}

/// Daemon settings as written in the file; unset paths are derived
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    node_name: Option<String>,
    node_id: Option<u32>,
    socket_path: Option<PathBuf>,
    peer_listen: Option<String>,
    #[serde(default)]
    peers: BTreeMap<String, String>,
    #[serde(default = "default_agent_dir")]
    agent_dir: PathBuf,
    cluster_config: Option<PathBuf>,
    log_path: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    #[serde(default)]
    privileged_uids: Vec<u32>,
    #[serde(default = "default_gossip_interval", with = "humantime_serde")]
    gossip_interval: Duration,
    #[serde(default = "default_probe_ttl", with = "humantime_serde")]
    probe_ttl: Duration,
    #[serde(default = "default_history_cap")]
    history_cap: usize,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    default_timeout: Duration,
    notify_command: Option<String>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            node_name: None,
            node_id: None,
            socket_path: None,
            peer_listen: None,
            peers: BTreeMap::new(),
            agent_dir: default_agent_dir(),
            cluster_config: None,
            log_path: None,
            state_dir: None,
            privileged_uids: Vec::new(),
            gossip_interval: default_gossip_interval(),
            probe_ttl: default_probe_ttl(),
            history_cap: default_history_cap(),
            default_timeout: default_timeout(),
            notify_command: None,
        }
    }
}

fn default_agent_dir() -> PathBuf {
    PathBuf::from("/usr/sbin")
}

fn default_gossip_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_probe_ttl() -> Duration {
    Duration::from_secs(120)
}

fn default_history_cap() -> usize {
    fenced_storage::DEFAULT_CAP
}

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Resolved daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub node_name: String,
    pub node_id: Option<u32>,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Address the peer listener binds; no listener when unset
    pub peer_listen: Option<String>,
    /// Peer name -> address
    pub peers: BTreeMap<String, String>,
    pub agent_dir: PathBuf,
    pub cluster_config: Option<PathBuf>,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to version file
    pub version_path: PathBuf,
    pub log_path: PathBuf,
    pub privileged_uids: Vec<u32>,
    pub gossip_interval: Duration,
    pub probe_ttl: Duration,
    pub history_cap: usize,
    pub default_timeout: Duration,
    pub notify_command: Option<String>,
}

impl DaemonConfig {
    /// Load from `FENCED_CONFIG`, then the default path. A missing file at
    /// the default path means all defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let (path, explicit) = match std::env::var(CONFIG_ENV) {
            Ok(p) => (PathBuf::from(p), true),
            Err(_) => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };
        if !explicit && !path.exists() {
            return Self::from_raw(RawConfig::default());
        }
        Self::from_file(&path)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.gossip_interval.is_zero() || raw.gossip_interval > MAX_GOSSIP_INTERVAL {
            return Err(ConfigError::GossipInterval(raw.gossip_interval));
        }
        if raw.history_cap == 0 {
            return Err(ConfigError::HistoryCap);
        }

        let node_name = match raw.node_name {
            Some(name) => name,
            None => hostname()?,
        };
        let state_dir = match raw.state_dir {
            Some(dir) => dir,
            None => state_dir()?,
        };
        let socket_path = match std::env::var(SOCKET_ENV) {
            Ok(p) => PathBuf::from(p),
            Err(_) => raw
                .socket_path
                .unwrap_or_else(|| state_dir.join("fenced.sock")),
        };

        Ok(Self {
            node_name,
            node_id: raw.node_id,
            socket_path,
            peer_listen: raw.peer_listen,
            peers: raw.peers,
            agent_dir: raw.agent_dir,
            cluster_config: raw.cluster_config,
            lock_path: state_dir.join("fenced.pid"),
            version_path: state_dir.join("fenced.version"),
            log_path: raw.log_path.unwrap_or_else(|| state_dir.join("fenced.log")),
            privileged_uids: raw.privileged_uids,
            gossip_interval: raw.gossip_interval,
            probe_ttl: raw.probe_ttl,
            history_cap: raw.history_cap,
            default_timeout: raw.default_timeout,
            notify_command: raw.notify_command,
        })
    }

    /// Whether a client with `uid` may run privileged operations
    pub fn is_privileged(&self, uid: u32, daemon_uid: u32) -> bool {
        uid == 0 || uid == daemon_uid || self.privileged_uids.contains(&uid)
    }
}

fn hostname() -> Result<String, ConfigError> {
    let name = nix::unistd::gethostname().map_err(|_| ConfigError::NodeName)?;
    let name = name.into_string().map_err(|_| ConfigError::NodeName)?;
    // Short name, as cluster nodes are usually listed
    match name.split('.').next() {
        Some(short) if !short.is_empty() => Ok(short.to_string()),
        _ => Err(ConfigError::NodeName),
    }
}

/// Default socket, log and lock location: `$XDG_STATE_HOME/fenced` or
/// `~/.local/state/fenced`
pub fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("fenced"));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/fenced"))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
