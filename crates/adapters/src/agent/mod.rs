// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fencing agent adapters
//!
//! An agent is an executable following the fence-agent convention: it reads
//! `key=value` lines on stdin (also exported as `OCF_RESKEY_<key>`), performs
//! the requested action and reports through its exit status.

mod process;

pub use process::{ProcessAgentAdapter, KILL_GRACE};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{AgentCall, FakeAgentAdapter, FakeOutcome};

use async_trait::async_trait;
use fenced_core::{Action, FenceError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// One run of an agent against a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentInvocation {
    pub device: String,
    pub agent: String,
    /// Action as requested, before alias mapping
    pub action: Action,
    /// Arguments in the order they are written, `action` first
    pub args: Vec<(String, String)>,
    pub timeout: Duration,
}

impl AgentInvocation {
    /// Value of the `action` argument handed to the agent
    pub fn agent_action(&self) -> &str {
        self.args
            .iter()
            .find(|(k, _)| k == "action")
            .map(|(_, v)| v.as_str())
            .unwrap_or_else(|| self.action.as_str())
    }
}

/// Output of an agent that exited 0
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Errors from agent runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("could not execute {agent}: {reason}")]
    SpawnFailed { agent: String, reason: String },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
    #[error("exited with {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
    #[error("killed by signal {0}")]
    Signal(i32),
    #[error("agent not installed: {0}")]
    NotInstalled(String),
    #[error("io error: {0}")]
    Io(String),
}

impl AgentError {
    /// Client-visible error for a failed run
    pub fn to_fence_error(&self) -> FenceError {
        match self {
            AgentError::SpawnFailed { .. } | AgentError::Io(_) => {
                FenceError::Spawn(self.to_string())
            }
            AgentError::NotInstalled(agent) => FenceError::Unknown(format!("agent {agent}")),
            AgentError::Timeout(_) => FenceError::Timeout(self.to_string()),
            AgentError::Cancelled => FenceError::Cancelled,
            AgentError::Signal(_) => FenceError::AgentFailure(self.to_string()),
            AgentError::NonZeroExit { stderr, .. } => {
                if stderr.contains("imed out") {
                    FenceError::Timeout(self.to_string())
                } else if stderr.contains("Unrecognised action") {
                    FenceError::NotSupported(self.to_string())
                } else {
                    FenceError::AgentFailure(self.to_string())
                }
            }
        }
    }

    /// Worth another try within the same attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self.to_fence_error(),
            FenceError::Timeout(_) | FenceError::Cancelled | FenceError::NotSupported(_)
        ) && !matches!(self, AgentError::NotInstalled(_) | AgentError::SpawnFailed { .. })
    }
}

/// Adapter for running fencing agents
#[async_trait]
pub trait AgentAdapter: Clone + Send + Sync + 'static {
    /// Run an agent to completion. A `true` on `cancel` stops the agent:
    /// TERM, then KILL after a grace period.
    async fn execute(
        &self,
        invocation: AgentInvocation,
        cancel: watch::Receiver<bool>,
    ) -> Result<AgentOutput, AgentError>;

    /// Whether an agent binary of this name exists
    fn is_installed(&self, agent: &str) -> bool;

    /// Names of installed agents, sorted
    async fn list_installed(&self) -> Result<Vec<String>, AgentError>;

    /// The agent's self-description (its `metadata` action)
    async fn metadata(&self, agent: &str, timeout: Duration) -> Result<String, AgentError>;
}

/// Turn a `list` action's stdout into target names. Agents print one target
/// per line, optionally followed by an alias or other columns.
pub fn parse_list_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter_map(|line| {
            line.split(|c: char| c == ',' || c.is_whitespace())
                .find(|s| !s.is_empty())
        })
        .map(String::from)
        .collect()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
