// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent adapter that spawns agent binaries from a directory

use super::{AgentAdapter, AgentError, AgentInvocation, AgentOutput};
use async_trait::async_trait;
use fenced_core::Action;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::watch;

/// Time between TERM and KILL when stopping an agent
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// Prefix shared by fencing agent binaries
const AGENT_PREFIX: &str = "fence_";

#[derive(Clone)]
pub struct ProcessAgentAdapter {
    agent_dir: PathBuf,
}

impl ProcessAgentAdapter {
    pub fn new(agent_dir: impl Into<PathBuf>) -> Self {
        Self {
            agent_dir: agent_dir.into(),
        }
    }

    fn path_of(&self, agent: &str) -> Option<PathBuf> {
        if agent.is_empty() || agent.contains('/') {
            return None;
        }
        let path = self.agent_dir.join(agent);
        is_executable(&path).then_some(path)
    }
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

enum Interrupted {
    Timeout,
    Cancelled,
}

/// Resolves once cancellation is requested; never if the sender goes away
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn signal(pid: Option<u32>, sig: Signal) {
    if let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) {
        if let Err(e) = kill(Pid::from_raw(pid), sig) {
            tracing::debug!(pid, ?sig, error = %e, "signal failed");
        }
    }
}

#[async_trait]
impl AgentAdapter for ProcessAgentAdapter {
    async fn execute(
        &self,
        invocation: AgentInvocation,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<AgentOutput, AgentError> {
        let path = self
            .path_of(&invocation.agent)
            .ok_or_else(|| AgentError::NotInstalled(invocation.agent.clone()))?;

        let mut cmd = Command::new(&path);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &invocation.args {
            cmd.env(format!("OCF_RESKEY_{key}"), value);
        }

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| AgentError::SpawnFailed {
            agent: invocation.agent.clone(),
            reason: e.to_string(),
        })?;
        let pid = child.id();

        // Written off to the side: an agent that never reads a large
        // argument list must not hold the job past its timeout
        if let Some(mut stdin) = child.stdin.take() {
            let mut input = String::new();
            for (key, value) in &invocation.args {
                input.push_str(&format!("{key}={value}\n"));
            }
            tokio::spawn(async move {
                // Agents that ignore stdin may close it early
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    tracing::debug!(error = %e, "agent did not read its arguments");
                }
            });
        }

        let wait = child.wait_with_output();
        tokio::pin!(wait);

        let interrupted = tokio::select! {
            result = &mut wait => {
                let output = result.map_err(|e| AgentError::Io(e.to_string()))?;
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                return match (output.status.code(), output.status.signal()) {
                    (Some(0), _) => Ok(AgentOutput {
                        stdout,
                        stderr,
                        elapsed: start.elapsed(),
                    }),
                    (Some(code), _) => Err(AgentError::NonZeroExit { code, stderr }),
                    (None, Some(sig)) => Err(AgentError::Signal(sig)),
                    (None, None) => Err(AgentError::Io("unknown exit status".into())),
                };
            }
            _ = tokio::time::sleep(invocation.timeout) => Interrupted::Timeout,
            _ = cancelled(&mut cancel) => Interrupted::Cancelled,
        };

        signal(pid, Signal::SIGTERM);
        if tokio::time::timeout(KILL_GRACE, &mut wait).await.is_err() {
            tracing::warn!(device = %invocation.device, "agent ignored TERM, killing");
            signal(pid, Signal::SIGKILL);
            let _ = wait.await;
        }

        Err(match interrupted {
            Interrupted::Timeout => AgentError::Timeout(invocation.timeout),
            Interrupted::Cancelled => AgentError::Cancelled,
        })
    }

    fn is_installed(&self, agent: &str) -> bool {
        self.path_of(agent).is_some()
    }

    async fn list_installed(&self) -> Result<Vec<String>, AgentError> {
        let mut entries = tokio::fs::read_dir(&self.agent_dir)
            .await
            .map_err(|e| AgentError::Io(format!("{}: {e}", self.agent_dir.display())))?;
        let mut agents = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AgentError::Io(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(AGENT_PREFIX) && is_executable(&entry.path()) {
                agents.push(name);
            }
        }
        agents.sort();
        Ok(agents)
    }

    async fn metadata(&self, agent: &str, timeout: Duration) -> Result<String, AgentError> {
        let (_keep, cancel) = watch::channel(false);
        let invocation = AgentInvocation {
            device: String::new(),
            agent: agent.to_string(),
            action: Action::Metadata,
            args: vec![("action".to_string(), "metadata".to_string())],
            timeout,
        };
        self.execute(invocation, cancel).await.map(|o| o.stdout)
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
