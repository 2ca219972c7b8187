// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-visible error taxonomy
//!
//! Errors are values. Each kind maps to a stable negative return code that
//! crosses the IPC and peer wire; `from_rc` rebuilds the kind on the far side.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal failure kinds of a fencing request
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum FenceError {
    #[error("no device can act on the target")]
    NoDevices,
    #[error("not registered: {0}")]
    Unknown(String),
    #[error("device queue full: {0}")]
    Busy(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("agent failed: {0}")]
    AgentFailure(String),
    #[error("could not execute agent: {0}")]
    Spawn(String),
    #[error("peer unavailable: {0}")]
    PeerUnavailable(String),
    #[error("permission denied: {0}")]
    Denied(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("all fencing levels failed: {0}")]
    Exhausted(String),
    #[error("cancelled")]
    Cancelled,
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl FenceError {
    pub const RC_NO_DEVICES: i32 = -19;
    pub const RC_UNKNOWN: i32 = -6;
    pub const RC_BUSY: i32 = -16;
    pub const RC_TIMEOUT: i32 = -62;
    pub const RC_AGENT_FAILURE: i32 = -201;
    pub const RC_SPAWN: i32 = -8;
    pub const RC_PEER_UNAVAILABLE: i32 = -113;
    pub const RC_DENIED: i32 = -13;
    pub const RC_BAD_REQUEST: i32 = -22;
    pub const RC_EXHAUSTED: i32 = -71;
    pub const RC_CANCELLED: i32 = -125;
    pub const RC_NOT_SUPPORTED: i32 = -95;

    /// Negative return code reported to clients and peers
    pub fn rc(&self) -> i32 {
        match self {
            FenceError::NoDevices => Self::RC_NO_DEVICES,
            FenceError::Unknown(_) => Self::RC_UNKNOWN,
            FenceError::Busy(_) => Self::RC_BUSY,
            FenceError::Timeout(_) => Self::RC_TIMEOUT,
            FenceError::AgentFailure(_) => Self::RC_AGENT_FAILURE,
            FenceError::Spawn(_) => Self::RC_SPAWN,
            FenceError::PeerUnavailable(_) => Self::RC_PEER_UNAVAILABLE,
            FenceError::Denied(_) => Self::RC_DENIED,
            FenceError::BadRequest(_) => Self::RC_BAD_REQUEST,
            FenceError::Exhausted(_) => Self::RC_EXHAUSTED,
            FenceError::Cancelled => Self::RC_CANCELLED,
            FenceError::NotSupported(_) => Self::RC_NOT_SUPPORTED,
        }
    }

    /// Short name of the kind, as shown by the CLI
    pub fn kind(&self) -> &'static str {
        match self {
            FenceError::NoDevices => "NoDevices",
            FenceError::Unknown(_) => "Unknown",
            FenceError::Busy(_) => "Busy",
            FenceError::Timeout(_) => "Timeout",
            FenceError::AgentFailure(_) => "AgentFailure",
            FenceError::Spawn(_) => "Spawn",
            FenceError::PeerUnavailable(_) => "PeerUnavailable",
            FenceError::Denied(_) => "Denied",
            FenceError::BadRequest(_) => "BadRequest",
            FenceError::Exhausted(_) => "Exhausted",
            FenceError::Cancelled => "Cancelled",
            FenceError::NotSupported(_) => "NotSupported",
        }
    }

    /// Human-readable reason without the kind prefix
    pub fn reason(&self) -> String {
        match self {
            FenceError::NoDevices | FenceError::Cancelled => self.to_string(),
            FenceError::Unknown(r)
            | FenceError::Busy(r)
            | FenceError::Timeout(r)
            | FenceError::AgentFailure(r)
            | FenceError::Spawn(r)
            | FenceError::PeerUnavailable(r)
            | FenceError::Denied(r)
            | FenceError::BadRequest(r)
            | FenceError::Exhausted(r)
            | FenceError::NotSupported(r) => r.clone(),
        }
    }

    /// Rebuild an error from a wire return code. Returns `None` for success.
    pub fn from_rc(rc: i32, reason: impl Into<String>) -> Option<FenceError> {
        let reason = reason.into();
        let err = match rc {
            0 => return None,
            Self::RC_NO_DEVICES => FenceError::NoDevices,
            Self::RC_UNKNOWN => FenceError::Unknown(reason),
            Self::RC_BUSY => FenceError::Busy(reason),
            Self::RC_TIMEOUT => FenceError::Timeout(reason),
            Self::RC_SPAWN => FenceError::Spawn(reason),
            Self::RC_PEER_UNAVAILABLE => FenceError::PeerUnavailable(reason),
            Self::RC_DENIED => FenceError::Denied(reason),
            Self::RC_BAD_REQUEST => FenceError::BadRequest(reason),
            Self::RC_EXHAUSTED => FenceError::Exhausted(reason),
            Self::RC_CANCELLED => FenceError::Cancelled,
            Self::RC_NOT_SUPPORTED => FenceError::NotSupported(reason),
            _ => FenceError::AgentFailure(reason),
        };
        Some(err)
    }
}

/// Return code of a result: 0 on success, the error's code otherwise
pub fn rc_of<T>(result: &Result<T, FenceError>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.rc(),
    }
}

/// Errors rejecting a device registration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("agent not installed: {0}")]
    UnknownAgent(String),
    #[error("bad device parameters: {0}")]
    BadParameters(String),
    #[error("device disabled: {0}")]
    Disabled(String),
}

impl RegisterError {
    /// Return code reported to clients
    pub fn rc(&self) -> i32 {
        match self {
            RegisterError::UnknownAgent(_) => -2,
            RegisterError::BadParameters(_) => FenceError::RC_BAD_REQUEST,
            RegisterError::Disabled(_) => FenceError::RC_NOT_SUPPORTED,
        }
    }
}

impl From<RegisterError> for FenceError {
    fn from(err: RegisterError) -> Self {
        match err {
            RegisterError::UnknownAgent(agent) => FenceError::Unknown(format!("agent {agent}")),
            RegisterError::BadParameters(reason) => FenceError::BadRequest(reason),
            RegisterError::Disabled(reason) => FenceError::NotSupported(reason),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
