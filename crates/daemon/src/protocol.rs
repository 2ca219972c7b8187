// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol between `fence-admin` (and other local clients) and `fenced`
//!
//! One request and one response per connection. Each message is a 4-byte
//! big-endian length followed by a JSON body.

use std::collections::BTreeMap;
use std::time::Duration;

use fenced_core::{Action, DeviceSpec, FenceError, HistoryRecord, OpId, TargetSpec};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bumped on incompatible changes to [`Request`] or [`Response`]
pub const PROTOCOL_VERSION: &str = "1";

/// Read/write timeout for a single message
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest message accepted in either direction
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Request from a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Hello {
        version: String,
    },
    Ping,
    Status,
    Shutdown,
    RegisterDevice {
        device: String,
        agent: String,
        #[serde(default)]
        params: BTreeMap<String, String>,
        #[serde(default)]
        unfencing: bool,
    },
    DeregisterDevice {
        device: String,
    },
    RegisterLevel {
        target: TargetSpec,
        index: u8,
        devices: Vec<String>,
    },
    DeregisterLevel {
        target: TargetSpec,
        index: u8,
    },
    ListRegistered,
    ListInstalled,
    /// Devices able to run `action` against `target`
    Query {
        target: String,
        #[serde(default = "default_query_action")]
        action: Action,
    },
    /// Run a device's monitor action
    DeviceStatus {
        device: String,
        #[serde(default)]
        timeout_s: Option<u64>,
    },
    Metadata {
        agent: String,
        #[serde(default)]
        timeout_s: Option<u64>,
    },
    Fence {
        target: String,
        action: Action,
        #[serde(default)]
        timeout_s: Option<u64>,
        #[serde(default)]
        tolerance_s: Option<u64>,
        #[serde(default)]
        allow_self_fencing: bool,
        /// Answer with the op id right away instead of the outcome
        #[serde(default, rename = "async")]
        detach: bool,
        #[serde(default)]
        client_id: Option<String>,
    },
    Cancel {
        op_id: OpId,
    },
    History {
        #[serde(default)]
        target: Option<String>,
    },
}

fn default_query_action() -> Action {
    Action::Off
}

impl Request {
    /// Short name for logs
    pub fn op(&self) -> &'static str {
        match self {
            Request::Hello { .. } => "hello",
            Request::Ping => "ping",
            Request::Status => "status",
            Request::Shutdown => "shutdown",
            Request::RegisterDevice { .. } => "register_device",
            Request::DeregisterDevice { .. } => "deregister_device",
            Request::RegisterLevel { .. } => "register_level",
            Request::DeregisterLevel { .. } => "deregister_level",
            Request::ListRegistered => "list_registered",
            Request::ListInstalled => "list_installed",
            Request::Query { .. } => "query",
            Request::DeviceStatus { .. } => "device_status",
            Request::Metadata { .. } => "metadata",
            Request::Fence { .. } => "fence",
            Request::Cancel { .. } => "cancel",
            Request::History { .. } => "history",
        }
    }

    /// The device this registration describes
    pub fn device_spec(&self) -> Option<DeviceSpec> {
        match self {
            Request::RegisterDevice {
                device,
                agent,
                params,
                unfencing,
            } => Some(DeviceSpec {
                id: device.clone(),
                agent: agent.clone(),
                params: params.clone(),
                provides_unfencing: *unfencing,
            }),
            _ => None,
        }
    }
}

/// Daemon summary for `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub node: String,
    pub version: String,
    pub uptime_secs: u64,
    pub devices: usize,
    pub levels: usize,
    pub operations: usize,
    pub active_peers: Vec<String>,
    pub busy_devices: usize,
}

/// One entry of a `query` answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSummary {
    pub peer: String,
    pub device: String,
    pub rank: String,
    pub timeout_s: u64,
}

/// Response from the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Hello {
        version: String,
    },
    Pong,
    Ok,
    ShuttingDown,
    Error {
        rc: i32,
        reason: String,
    },
    Status {
        status: DaemonStatus,
    },
    Registered {
        device: String,
        replaced: bool,
        disabled: bool,
    },
    Devices {
        devices: Vec<String>,
    },
    Agents {
        agents: Vec<String>,
    },
    Candidates {
        candidates: Vec<CandidateSummary>,
    },
    Metadata {
        metadata: String,
    },
    /// A fence request was taken; its outcome follows only on request
    Accepted {
        op_id: OpId,
        merged: bool,
    },
    /// Terminal outcome of a fence request
    Fenced {
        op_id: OpId,
        rc: i32,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        delegate: Option<String>,
        merged: bool,
    },
    History {
        records: Vec<HistoryRecord>,
    },
}

impl Response {
    pub fn error(err: &FenceError) -> Self {
        Response::Error {
            rc: err.rc(),
            reason: err.reason(),
        }
    }
}

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout")]
    Timeout,
}

/// Serialize a message body (no length prefix)
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(value)?)
}

pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Write one length-prefixed message
pub async fn write_message<W>(writer: &mut W, data: &[u8]) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: data.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    let len = data.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed message
pub async fn read_message<R>(reader: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

pub async fn read_request<R>(reader: &mut R, timeout: Duration) -> Result<Request, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

pub async fn write_response<W>(
    writer: &mut W,
    response: &Response,
    timeout: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let data = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
