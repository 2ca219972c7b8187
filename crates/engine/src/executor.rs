// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effect executor

use crate::events::{AgentJob, JobKind, RuntimeEvent};
use crate::queue::{CancelOutcome, DeviceQueues, Started};
use crate::Scheduler;
use fenced_adapters::notify::{CHANNEL_CONFIG, CHANNEL_FENCE};
use fenced_adapters::{
    AgentAdapter, AgentError, AgentOutput, NotifyAdapter, PeerAdapter, PeerError,
};
use fenced_core::{Clock, Effect, Event, PeerMessage, MAX_TIMEOUT};
use fenced_storage::HistoryStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::Instrument;

/// A retry is only worth it while this share of the budget remains
const RETRY_BUDGET_PERCENT: u32 = 30;

/// Errors that can occur during effect execution
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("peer error: {0}")]
    Peer(#[from] PeerError),
    #[error("notify error: {0}")]
    Notify(#[from] fenced_adapters::NotifyError),
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("agent run for {0} was not resolved to a device")]
    Unresolved(String),
}

/// Adapter dependencies of the executor
pub struct ExecutorDeps<A, P, N> {
    pub agents: A,
    pub peers: P,
    pub notify: N,
    pub history: Arc<Mutex<HistoryStore>>,
    pub events: mpsc::Sender<RuntimeEvent>,
}

/// Executes effects using the configured adapters
pub struct Executor<A, P, N, C> {
    agents: A,
    peers: P,
    notify: N,
    history: Arc<Mutex<HistoryStore>>,
    scheduler: Arc<Mutex<Scheduler>>,
    queues: Arc<Mutex<DeviceQueues>>,
    events: mpsc::Sender<RuntimeEvent>,
    clock: C,
}

impl<A, P, N, C> Executor<A, P, N, C>
where
    A: AgentAdapter,
    P: PeerAdapter,
    N: NotifyAdapter,
    C: Clock,
{
    pub fn new(deps: ExecutorDeps<A, P, N>, scheduler: Arc<Mutex<Scheduler>>, clock: C) -> Self {
        Self {
            agents: deps.agents,
            peers: deps.peers,
            notify: deps.notify,
            history: deps.history,
            scheduler,
            queues: Arc::new(Mutex::new(DeviceQueues::new())),
            events: deps.events,
            clock,
        }
    }

    /// Execute a single effect with tracing
    ///
    /// Returns an optional event that should be fed back into the event loop.
    pub async fn execute(&self, effect: Effect) -> Result<Option<RuntimeEvent>, ExecuteError> {
        use fenced_core::TracedEffect;

        let span = tracing::info_span!("effect", effect = effect.name());
        async move {
            tracing::debug!(fields = ?effect.fields(), "executing");

            let start = std::time::Instant::now();
            let result = self.execute_inner(effect).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(event) => tracing::debug!(elapsed_ms, has_event = event.is_some(), "completed"),
                Err(e) => tracing::warn!(elapsed_ms, error = %e, "failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute_inner(&self, effect: Effect) -> Result<Option<RuntimeEvent>, ExecuteError> {
        match effect {
            Effect::RunAgent { device, .. } => Err(ExecuteError::Unresolved(device)),

            Effect::CancelAgent {
                op_id,
                attempt,
                device,
            } => {
                let kind = JobKind::Attempt { op_id, attempt };
                Ok(self.cancel_job(&device, kind, true))
            }

            Effect::SendPeer { peer, message } => {
                self.peers.send(&peer, message).await?;
                Ok(None)
            }

            Effect::Broadcast { message } => {
                self.peers.broadcast(message).await?;
                Ok(None)
            }

            Effect::RecordHistory { record } => {
                let outcome = self
                    .history
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .append(record.clone());
                if outcome.changed() {
                    self.peers
                        .broadcast(PeerMessage::HistoryAppend { record })
                        .await?;
                }
                Ok(None)
            }

            Effect::SetTimer { id, duration } => {
                let now = self.clock.now();
                self.scheduler
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .set_timer(id, duration, now);
                Ok(None)
            }

            Effect::CancelTimer { id } => {
                self.scheduler
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .cancel_timer(&id);
                Ok(None)
            }

            Effect::Emit(event) => {
                let message = serde_json::to_string(&event)?;
                self.notify.send(channel_for(&event), &message).await?;
                Ok(None)
            }
        }
    }

    /// Execute multiple effects in order, stopping at the first failure
    pub async fn execute_all(&self, effects: Vec<Effect>) -> Result<Vec<RuntimeEvent>, ExecuteError> {
        let mut result_events = Vec::new();
        for effect in effects {
            if let Some(event) = self.execute(effect).await? {
                result_events.push(event);
            }
        }
        Ok(result_events)
    }

    /// Queue an agent job. A full device queue hands the job back.
    pub fn submit(&self, job: AgentJob) -> Result<(), AgentJob> {
        let started = self
            .queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .submit(job)?;
        if let Some(started) = started {
            tokio::spawn(drain_device(
                self.agents.clone(),
                Arc::clone(&self.queues),
                self.events.clone(),
                started,
            ));
        }
        Ok(())
    }

    /// Cancel a queued job, and a running one when `interrupt` is set. A job
    /// removed from its queue yields its `Cancelled` completion.
    pub fn cancel_job(&self, device: &str, kind: JobKind, interrupt: bool) -> Option<RuntimeEvent> {
        let outcome = self
            .queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel(device, &kind, interrupt);
        tracing::debug!(device, job = kind.label(), ?outcome, "cancel requested");
        match outcome {
            CancelOutcome::Dequeued(job) => Some(RuntimeEvent::AgentFinished {
                kind: job.kind.clone(),
                device: device.to_string(),
                action: job.action(),
                result: Err(AgentError::Cancelled),
            }),
            CancelOutcome::Signalled | CancelOutcome::Running | CancelOutcome::NotFound => None,
        }
    }

    /// Devices with a job running
    pub fn active_devices(&self) -> usize {
        self.queues.lock().unwrap_or_else(|e| e.into_inner()).active()
    }

    pub fn agents(&self) -> &A {
        &self.agents
    }

    pub fn peers(&self) -> &P {
        &self.peers
    }

    /// Get a reference to the scheduler
    pub fn scheduler(&self) -> Arc<Mutex<Scheduler>> {
        Arc::clone(&self.scheduler)
    }

    /// Get a reference to the history store
    pub fn history(&self) -> Arc<Mutex<HistoryStore>> {
        Arc::clone(&self.history)
    }
}

fn channel_for(event: &Event) -> &'static str {
    match event {
        Event::OperationStarted { .. } | Event::OperationFinished { .. } => CHANNEL_FENCE,
        _ => CHANNEL_CONFIG,
    }
}

/// Run the jobs of one device back to back until its queue is empty
async fn drain_device<A: AgentAdapter>(
    agents: A,
    queues: Arc<Mutex<DeviceQueues>>,
    events: mpsc::Sender<RuntimeEvent>,
    first: Started,
) {
    let mut next = Some(first);
    while let Some(Started { job, cancel }) = next {
        let device = job.device().to_string();
        let action = job.action();
        let _ = events
            .send(RuntimeEvent::AgentStarted {
                kind: job.kind.clone(),
                device: device.clone(),
            })
            .await;

        let result = run_with_retries(&agents, &job, cancel).await;

        let _ = events
            .send(RuntimeEvent::AgentFinished {
                kind: job.kind,
                device: device.clone(),
                action,
                result,
            })
            .await;

        next = queues
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .finish(&device);
    }
}

/// One job: the first run plus retries while enough budget remains
async fn run_with_retries<A: AgentAdapter>(
    agents: &A,
    job: &AgentJob,
    cancel: watch::Receiver<bool>,
) -> Result<AgentOutput, AgentError> {
    // Delegated jobs carry a peer's deadline, so bound it here as well
    let budget = job.invocation.timeout.min(MAX_TIMEOUT);
    let start = Instant::now();
    let deadline = start.checked_add(budget).unwrap_or(start);
    let mut tries = 0;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut invocation = job.invocation.clone();
        invocation.timeout = remaining;

        let result = agents.execute(invocation, cancel.clone()).await;
        let err = match result {
            Ok(output) => return Ok(output),
            Err(e) => e,
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        if tries >= job.retries
            || !err.is_retryable()
            || *cancel.borrow()
            || remaining < budget_share(budget)
        {
            return Err(err);
        }
        tries += 1;
        tracing::info!(
            device = %job.invocation.device,
            tries,
            error = %err,
            "retrying agent"
        );
    }
}

fn budget_share(budget: Duration) -> Duration {
    budget * RETRY_BUDGET_PERCENT / 100
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
