// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake agent adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{AgentAdapter, AgentError, AgentInvocation, AgentOutput};
use async_trait::async_trait;
use fenced_core::Action;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Recorded agent run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCall {
    pub device: String,
    pub agent: String,
    pub action: Action,
    pub args: Vec<(String, String)>,
    pub timeout: Duration,
}

/// Scripted result of one run
#[derive(Debug, Clone)]
pub struct FakeOutcome {
    pub result: Result<String, AgentError>,
    /// How long the run takes; exceeding the invocation timeout yields Timeout
    pub delay: Duration,
}

impl FakeOutcome {
    pub fn ok() -> Self {
        Self::stdout("")
    }

    pub fn stdout(out: impl Into<String>) -> Self {
        Self {
            result: Ok(out.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn exit(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            result: Err(AgentError::NonZeroExit {
                code,
                stderr: stderr.into(),
            }),
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct FakeState {
    installed: BTreeSet<String>,
    /// Scripted outcomes per (device, action), consumed in order; the last
    /// one repeats
    scripts: HashMap<(String, Action), VecDeque<FakeOutcome>>,
    calls: Vec<AgentCall>,
    in_flight: HashMap<String, usize>,
    max_in_flight: HashMap<String, usize>,
}

/// Fake agent adapter for testing
///
/// Runs succeed immediately unless scripted otherwise. Tracks how many runs
/// are in flight per device.
#[derive(Clone)]
pub struct FakeAgentAdapter {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeAgentAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAgentAdapter {
    /// A fake with `fence_dummy` installed
    pub fn new() -> Self {
        let adapter = Self {
            state: Arc::new(Mutex::new(FakeState::default())),
        };
        adapter.install("fence_dummy");
        adapter
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn install(&self, agent: &str) {
        self.lock().installed.insert(agent.to_string());
    }

    /// Script the outcomes of runs of `action` on `device`
    pub fn script(&self, device: &str, action: Action, outcomes: Vec<FakeOutcome>) {
        self.lock()
            .scripts
            .insert((device.to_string(), action), outcomes.into());
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<AgentCall> {
        self.lock().calls.clone()
    }

    /// Recorded calls for one device and action
    pub fn calls_for(&self, device: &str, action: Action) -> Vec<AgentCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.device == device && c.action == action)
            .cloned()
            .collect()
    }

    /// Highest number of concurrent runs ever observed for a device
    pub fn max_in_flight(&self, device: &str) -> usize {
        self.lock().max_in_flight.get(device).copied().unwrap_or(0)
    }

    fn next_outcome(&self, device: &str, action: Action) -> FakeOutcome {
        let mut state = self.lock();
        match state.scripts.get_mut(&(device.to_string(), action)) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(FakeOutcome::ok),
            Some(queue) => queue.front().cloned().unwrap_or_else(FakeOutcome::ok),
            None => FakeOutcome::ok(),
        }
    }
}

#[async_trait]
impl AgentAdapter for FakeAgentAdapter {
    async fn execute(
        &self,
        invocation: AgentInvocation,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<AgentOutput, AgentError> {
        {
            let mut state = self.lock();
            state.calls.push(AgentCall {
                device: invocation.device.clone(),
                agent: invocation.agent.clone(),
                action: invocation.action,
                args: invocation.args.clone(),
                timeout: invocation.timeout,
            });
            if !state.installed.contains(&invocation.agent) {
                return Err(AgentError::NotInstalled(invocation.agent));
            }
            let count = state.in_flight.entry(invocation.device.clone()).or_insert(0);
            *count += 1;
            let now = *count;
            let max = state
                .max_in_flight
                .entry(invocation.device.clone())
                .or_insert(0);
            *max = (*max).max(now);
        }

        let outcome = self.next_outcome(&invocation.device, invocation.action);
        let wait = outcome.delay.min(invocation.timeout);
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(wait) => None,
            _ = async {
                loop {
                    if *cancel.borrow_and_update() {
                        return;
                    }
                    if cancel.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
            } => Some(AgentError::Cancelled),
        };

        {
            let mut state = self.lock();
            if let Some(count) = state.in_flight.get_mut(&invocation.device) {
                *count = count.saturating_sub(1);
            }
        }

        if let Some(err) = interrupted {
            return Err(err);
        }
        if outcome.delay > invocation.timeout {
            return Err(AgentError::Timeout(invocation.timeout));
        }
        outcome.result.map(|stdout| AgentOutput {
            stdout,
            stderr: String::new(),
            elapsed: outcome.delay,
        })
    }

    fn is_installed(&self, agent: &str) -> bool {
        self.lock().installed.contains(agent)
    }

    async fn list_installed(&self) -> Result<Vec<String>, AgentError> {
        Ok(self.lock().installed.iter().cloned().collect())
    }

    async fn metadata(&self, agent: &str, _timeout: Duration) -> Result<String, AgentError> {
        if !self.is_installed(agent) {
            return Err(AgentError::NotInstalled(agent.to_string()));
        }
        Ok(format!("<resource-agent name=\"{agent}\"/>"))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
