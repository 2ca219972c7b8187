// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-device job queues
//!
//! A device runs at most one job at a time. Later jobs wait in a bounded
//! queue; a full queue rejects new work instead of growing.

use crate::events::{AgentJob, JobKind};
use std::collections::{HashMap, VecDeque};
use tokio::sync::watch;

/// Jobs allowed to wait behind the running one
pub const QUEUE_LIMIT: usize = 16;

/// A job cleared to run, with the receiving end of its cancel switch
#[derive(Debug)]
pub struct Started {
    pub job: AgentJob,
    pub cancel: watch::Receiver<bool>,
}

#[derive(Debug)]
pub enum CancelOutcome {
    /// Removed before it started
    Dequeued(AgentJob),
    /// Running; the agent was told to stop
    Signalled,
    /// Running and not interruptible
    Running,
    NotFound,
}

#[derive(Debug)]
struct Running {
    kind: JobKind,
    cancel: watch::Sender<bool>,
}

#[derive(Debug, Default)]
struct DeviceQueue {
    running: Option<Running>,
    pending: VecDeque<AgentJob>,
}

#[derive(Debug, Default)]
pub struct DeviceQueues {
    devices: HashMap<String, DeviceQueue>,
}

impl DeviceQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a job. Returns it back as `Started` when the device was idle,
    /// `Ok(None)` when it waits, or `Err(job)` when the queue is full.
    pub fn submit(&mut self, job: AgentJob) -> Result<Option<Started>, AgentJob> {
        let queue = self.devices.entry(job.device().to_string()).or_default();
        if queue.running.is_none() {
            return Ok(Some(start(queue, job)));
        }
        if queue.pending.len() >= QUEUE_LIMIT {
            return Err(job);
        }
        queue.pending.push_back(job);
        Ok(None)
    }

    /// The running job of `device` is done; start the next one, if any
    pub fn finish(&mut self, device: &str) -> Option<Started> {
        let queue = self.devices.get_mut(device)?;
        queue.running = None;
        match queue.pending.pop_front() {
            Some(job) => Some(start(queue, job)),
            None => {
                self.devices.remove(device);
                None
            }
        }
    }

    /// Cancel a job. A running job is only signalled when `interrupt` is set.
    pub fn cancel(&mut self, device: &str, kind: &JobKind, interrupt: bool) -> CancelOutcome {
        let Some(queue) = self.devices.get_mut(device) else {
            return CancelOutcome::NotFound;
        };
        if let Some(pos) = queue.pending.iter().position(|j| &j.kind == kind) {
            if let Some(job) = queue.pending.remove(pos) {
                return CancelOutcome::Dequeued(job);
            }
        }
        match &queue.running {
            Some(running) if &running.kind == kind => {
                if interrupt {
                    let _ = running.cancel.send(true);
                    CancelOutcome::Signalled
                } else {
                    CancelOutcome::Running
                }
            }
            _ => CancelOutcome::NotFound,
        }
    }

    pub fn is_busy(&self, device: &str) -> bool {
        self.devices
            .get(device)
            .is_some_and(|q| q.running.is_some())
    }

    pub fn pending(&self, device: &str) -> usize {
        self.devices.get(device).map(|q| q.pending.len()).unwrap_or(0)
    }

    /// Devices with a job running
    pub fn active(&self) -> usize {
        self.devices.values().filter(|q| q.running.is_some()).count()
    }
}

fn start(queue: &mut DeviceQueue, job: AgentJob) -> Started {
    let (tx, rx) = watch::channel(false);
    queue.running = Some(Running {
        kind: job.kind.clone(),
        cancel: tx,
    });
    Started { job, cancel: rx }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
