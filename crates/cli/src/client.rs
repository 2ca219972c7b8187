// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon client for CLI commands

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use fenced_core::{Action, HistoryRecord, OpId, TargetSpec};
use fenced_daemon::config::{self, DaemonConfig, SOCKET_ENV};
use fenced_daemon::protocol::{self, CandidateSummary, DaemonStatus, ProtocolError};
use fenced_daemon::{Request, Response, PROTOCOL_VERSION};
use thiserror::Error;
use tokio::net::UnixStream;

// Timeout configuration (env vars in milliseconds)
fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Timeout for requests the daemon answers without running anything
pub fn timeout_ipc() -> Duration {
    parse_duration_ms("FENCE_ADMIN_TIMEOUT_IPC_MS").unwrap_or(Duration::from_secs(5))
}

/// Extra wait beyond an operation's own timeout
pub fn wait_margin() -> Duration {
    parse_duration_ms("FENCE_ADMIN_WAIT_MARGIN_MS").unwrap_or(Duration::from_secs(30))
}

/// Fence budget assumed when none is given
pub const DEFAULT_FENCE_WAIT: Duration = Duration::from_secs(120);

/// Agent run budget assumed for status, metadata and listing
pub const DEFAULT_AGENT_WAIT: Duration = Duration::from_secs(10);

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Daemon not running (no socket at {0})")]
    DaemonNotRunning(PathBuf),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{reason}")]
    Rejected { rc: i32, reason: String },

    #[error("Unexpected response from daemon")]
    UnexpectedResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Daemon return code, when the daemon answered with one
    pub fn rc(&self) -> Option<i32> {
        match self {
            ClientError::Rejected { rc, .. } => Some(*rc),
            _ => None,
        }
    }
}

fn rejected(response: Response) -> ClientError {
    match response {
        Response::Error { rc, reason } => ClientError::Rejected { rc, reason },
        _ => ClientError::UnexpectedResponse,
    }
}

/// What a fence request came back with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenceReply {
    /// The operation finished successfully
    Done {
        op_id: OpId,
        delegate: Option<String>,
        merged: bool,
    },
    /// `--async`: the operation is running
    Accepted { op_id: OpId, merged: bool },
}

/// Parameters of a fence request
#[derive(Debug, Clone)]
pub struct FenceParams {
    pub target: String,
    pub action: Action,
    pub timeout: Option<Duration>,
    pub tolerance: Option<Duration>,
    pub allow_self_fencing: bool,
    pub detach: bool,
    pub client_id: Option<String>,
}

/// Daemon client
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Connect to a running daemon
    pub fn connect(socket_path: PathBuf) -> Result<Self, ClientError> {
        if !socket_path.exists() {
            return Err(ClientError::DaemonNotRunning(socket_path));
        }
        Ok(Self { socket_path })
    }

    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    /// Send a request and receive a response with specific timeouts
    async fn send_with_timeout(
        &self,
        request: Request,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Response, ClientError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (mut reader, mut writer) = stream.into_split();

        let data = protocol::encode(&request)?;
        tokio::time::timeout(write_timeout, protocol::write_message(&mut writer, &data))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        let response_bytes =
            tokio::time::timeout(read_timeout, protocol::read_message(&mut reader))
                .await
                .map_err(|_| ProtocolError::Timeout)??;

        let response: Response = protocol::decode(&response_bytes)?;
        Ok(response)
    }

    /// Send a request and receive a response
    pub async fn send(&self, request: Request) -> Result<Response, ClientError> {
        self.send_with_timeout(request, timeout_ipc(), timeout_ipc())
            .await
    }

    /// Send a request whose answer may take up to `budget` to arrive
    async fn send_waiting(&self, request: Request, budget: Duration) -> Result<Response, ClientError> {
        self.send_with_timeout(request, budget + wait_margin(), timeout_ipc())
            .await
    }

    async fn expect_ok(&self, request: Request) -> Result<(), ClientError> {
        match self.send(request).await? {
            Response::Ok => Ok(()),
            other => Err(rejected(other)),
        }
    }

    /// Daemon protocol version via Hello handshake
    pub async fn hello(&self) -> Result<String, ClientError> {
        match self
            .send(Request::Hello {
                version: PROTOCOL_VERSION.to_string(),
            })
            .await?
        {
            Response::Hello { version } => Ok(version),
            other => Err(rejected(other)),
        }
    }

    pub async fn status(&self) -> Result<DaemonStatus, ClientError> {
        match self.send(Request::Status).await? {
            Response::Status { status } => Ok(status),
            other => Err(rejected(other)),
        }
    }

    /// Request daemon shutdown
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        match self.send(Request::Shutdown).await? {
            Response::Ok | Response::ShuttingDown => Ok(()),
            other => Err(rejected(other)),
        }
    }

    /// Returns whether an existing registration was replaced
    pub async fn register_device(
        &self,
        device: &str,
        agent: &str,
        params: BTreeMap<String, String>,
        unfencing: bool,
    ) -> Result<bool, ClientError> {
        match self
            .send(Request::RegisterDevice {
                device: device.to_string(),
                agent: agent.to_string(),
                params,
                unfencing,
            })
            .await?
        {
            Response::Registered { replaced, .. } => Ok(replaced),
            other => Err(rejected(other)),
        }
    }

    pub async fn deregister_device(&self, device: &str) -> Result<(), ClientError> {
        self.expect_ok(Request::DeregisterDevice {
            device: device.to_string(),
        })
        .await
    }

    pub async fn register_level(
        &self,
        target: TargetSpec,
        index: u8,
        devices: Vec<String>,
    ) -> Result<(), ClientError> {
        self.expect_ok(Request::RegisterLevel {
            target,
            index,
            devices,
        })
        .await
    }

    pub async fn deregister_level(&self, target: TargetSpec, index: u8) -> Result<(), ClientError> {
        self.expect_ok(Request::DeregisterLevel { target, index })
            .await
    }

    pub async fn list_registered(&self) -> Result<Vec<String>, ClientError> {
        match self.send(Request::ListRegistered).await? {
            Response::Devices { devices } => Ok(devices),
            other => Err(rejected(other)),
        }
    }

    pub async fn list_installed(&self, timeout: Option<Duration>) -> Result<Vec<String>, ClientError> {
        let budget = timeout.unwrap_or(DEFAULT_AGENT_WAIT);
        match self.send_waiting(Request::ListInstalled, budget).await? {
            Response::Agents { agents } => Ok(agents),
            other => Err(rejected(other)),
        }
    }

    /// Devices able to fence `target`, best first
    pub async fn query(&self, target: &str) -> Result<Vec<CandidateSummary>, ClientError> {
        match self
            .send(Request::Query {
                target: target.to_string(),
                action: Action::Off,
            })
            .await?
        {
            Response::Candidates { candidates } => Ok(candidates),
            other => Err(rejected(other)),
        }
    }

    /// Run the device's monitor action
    pub async fn device_status(
        &self,
        device: &str,
        timeout: Option<Duration>,
    ) -> Result<(), ClientError> {
        let request = Request::DeviceStatus {
            device: device.to_string(),
            timeout_s: timeout.map(|t| t.as_secs()),
        };
        match self
            .send_waiting(request, timeout.unwrap_or(DEFAULT_FENCE_WAIT))
            .await?
        {
            Response::Ok => Ok(()),
            other => Err(rejected(other)),
        }
    }

    pub async fn metadata(&self, agent: &str, timeout: Option<Duration>) -> Result<String, ClientError> {
        let request = Request::Metadata {
            agent: agent.to_string(),
            timeout_s: timeout.map(|t| t.as_secs()),
        };
        match self
            .send_waiting(request, timeout.unwrap_or(DEFAULT_AGENT_WAIT))
            .await?
        {
            Response::Metadata { metadata } => Ok(metadata),
            other => Err(rejected(other)),
        }
    }

    /// Fence a node. Without `detach` this returns once the operation ends.
    pub async fn fence(&self, params: FenceParams) -> Result<FenceReply, ClientError> {
        let budget = params.timeout.unwrap_or(DEFAULT_FENCE_WAIT);
        let request = Request::Fence {
            target: params.target,
            action: params.action,
            timeout_s: params.timeout.map(|t| t.as_secs()),
            tolerance_s: params.tolerance.map(|t| t.as_secs()),
            allow_self_fencing: params.allow_self_fencing,
            detach: params.detach,
            client_id: params.client_id,
        };
        let response = if params.detach {
            self.send(request).await?
        } else {
            self.send_waiting(request, budget).await?
        };
        match response {
            Response::Accepted { op_id, merged } => Ok(FenceReply::Accepted { op_id, merged }),
            Response::Fenced {
                op_id,
                rc: 0,
                delegate,
                merged,
                ..
            } => Ok(FenceReply::Done {
                op_id,
                delegate,
                merged,
            }),
            Response::Fenced { rc, reason, .. } => Err(ClientError::Rejected {
                rc,
                reason: reason.unwrap_or_else(|| format!("fencing failed (rc {rc})")),
            }),
            other => Err(rejected(other)),
        }
    }

    pub async fn cancel(&self, op_id: &str) -> Result<(), ClientError> {
        self.expect_ok(Request::Cancel {
            op_id: OpId::from(op_id),
        })
        .await
    }

    /// History for `target`, or for every target when `None`
    pub async fn history(&self, target: Option<&str>) -> Result<Vec<HistoryRecord>, ClientError> {
        match self
            .send(Request::History {
                target: target.map(str::to_string),
            })
            .await?
        {
            Response::History { records } => Ok(records),
            other => Err(rejected(other)),
        }
    }
}

/// Where the daemon listens: `--socket`, then `FENCED_SOCKET_PATH`, then the
/// daemon configuration, then the default state directory
pub fn resolve_socket(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path);
    }
    if let Ok(path) = std::env::var(SOCKET_ENV) {
        return Some(PathBuf::from(path));
    }
    if let Ok(config) = DaemonConfig::load() {
        return Some(config.socket_path);
    }
    config::state_dir().ok().map(|dir| dir.join("fenced.sock"))
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
