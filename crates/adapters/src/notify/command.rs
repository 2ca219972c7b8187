// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notifications delivered by running an external command
//!
//! The command runs through `sh -c` with `FENCE_CHANNEL` and `FENCE_MESSAGE`
//! set. Output is discarded.

use super::{NotifyAdapter, NotifyError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct CommandNotifyAdapter {
    command: String,
    timeout: Duration,
}

impl CommandNotifyAdapter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl NotifyAdapter for CommandNotifyAdapter {
    async fn send(&self, channel: &str, message: &str) -> Result<(), NotifyError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .env("FENCE_CHANNEL", channel)
            .env("FENCE_MESSAGE", message)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| NotifyError::CommandFailed(e.to_string()))?;

        let status = tokio::time::timeout(self.timeout, child.wait())
            .await
            .map_err(|_| NotifyError::Timeout)?
            .map_err(|e| NotifyError::CommandFailed(e.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            Err(NotifyError::CommandFailed(format!("exited with {status}")))
        }
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
