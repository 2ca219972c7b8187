// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent job construction and completion

use super::{CoreState, FencerCore, Work};
use crate::events::{AgentJob, JobKind};
use fenced_adapters::{parse_list_output, AgentAdapter, AgentError, AgentInvocation, AgentOutput};
use fenced_adapters::{NotifyAdapter, PeerAdapter};
use fenced_core::{
    rc_of, Action, Clock, Device, Effect, FenceError, IdGen, OpId, OperationEvent, PeerMessage,
    ProbeTicket, WATCHDOG_DEVICE,
};
use std::collections::BTreeSet;
use std::time::Duration;

pub(super) fn invocation(
    device: &Device,
    action: Action,
    target: Option<&str>,
    timeout: Duration,
) -> AgentInvocation {
    AgentInvocation {
        device: device.id.clone(),
        agent: device.agent.clone(),
        action,
        args: device.agent_args(action, target),
        timeout,
    }
}

pub(super) fn probe_job(ticket: ProbeTicket) -> AgentJob {
    let timeout = ticket.device.timeout_for(Action::List);
    AgentJob {
        kind: JobKind::Probe {
            generation: ticket.generation,
        },
        invocation: invocation(&ticket.device, Action::List, None, timeout),
        retries: 0,
    }
}

/// A peer never powers itself off unless asked to; the watchdog device is
/// exempt since self-fencing is all it does.
pub(super) fn self_fence_denied(
    local: &str,
    target: &str,
    action: Action,
    device: &str,
    allow_self_fencing: bool,
) -> bool {
    target == local && action.is_destructive() && !allow_self_fencing && device != WATCHDOG_DEVICE
}

impl<A, P, N, C, I> FencerCore<A, P, N, C, I>
where
    A: AgentAdapter,
    P: PeerAdapter,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    /// Route the result of a finished agent job
    pub(super) async fn job_finished(
        &self,
        kind: JobKind,
        device: String,
        action: Action,
        result: Result<AgentOutput, AgentError>,
    ) -> Vec<Work> {
        if matches!(action, Action::Status | Action::Monitor) {
            self.lock()
                .registry
                .record_verification(&device, result.is_ok(), self.clock.utc_now());
        }

        match kind {
            JobKind::Attempt { op_id, attempt } => vec![Work::Event(
                op_id,
                OperationEvent::AttemptFinished {
                    attempt,
                    result: result.map(|_| ()).map_err(|e| e.to_fence_error()),
                },
            )],
            JobKind::Delegated {
                ref coordinator,
                ref op_id,
                attempt,
            } => {
                let started = self.lock().delegated.remove(&kind).map(|job| job.started);
                let result = result.map(|_| ()).map_err(|e| e.to_fence_error());
                self.reply(coordinator, op_id, attempt, result, started).await;
                Vec::new()
            }
            JobKind::Probe { generation } => {
                let targets = result
                    .map(|out| parse_list_output(&out.stdout).into_iter().collect())
                    .map_err(|e| e.to_string());
                let mut st = self.lock();
                self.probe_done(&mut st, &device, generation, targets)
            }
            JobKind::Verify { request } => {
                let waiter = self.lock().verifies.remove(&request);
                if let Some(tx) = waiter {
                    let _ = tx.send(result.map(|_| ()).map_err(|e| e.to_fence_error()));
                }
                Vec::new()
            }
        }
    }

    /// Cache a probe result and release the operations waiting on it
    pub(super) fn probe_done(
        &self,
        st: &mut CoreState,
        device: &str,
        generation: u64,
        result: Result<BTreeSet<String>, String>,
    ) -> Vec<Work> {
        let cached = st.registry.complete_probe(
            device,
            generation,
            result,
            self.clock.now(),
            self.clock.utc_now(),
        );
        if cached {
            st.gossip_dirty = true;
        }
        let mut ready = Vec::new();
        for (op_id, waiting) in st.awaiting_probes.iter_mut() {
            if waiting.remove(device) && waiting.is_empty() {
                ready.push(op_id.clone());
            }
        }
        ready.sort();
        ready.into_iter().map(Work::Plan).collect()
    }

    /// A job its device queue had no room for
    pub(super) async fn rejected(&self, job: AgentJob) -> Vec<Work> {
        let busy = FenceError::Busy(job.device().to_string());
        match job.kind {
            JobKind::Attempt { op_id, attempt } => vec![Work::Event(
                op_id,
                OperationEvent::AttemptFinished {
                    attempt,
                    result: Err(busy),
                },
            )],
            JobKind::Delegated {
                ref coordinator,
                ref op_id,
                attempt,
            } => {
                let started = self.lock().delegated.remove(&job.kind).map(|d| d.started);
                self.reply(coordinator, op_id, attempt, Err(busy), started)
                    .await;
                Vec::new()
            }
            JobKind::Probe { generation } => {
                let mut st = self.lock();
                self.probe_done(&mut st, &job.invocation.device, generation, Err(busy.to_string()))
            }
            JobKind::Verify { request } => {
                let waiter = self.lock().verifies.remove(&request);
                if let Some(tx) = waiter {
                    let _ = tx.send(Err(busy));
                }
                Vec::new()
            }
        }
    }

    /// Answer a coordinator about a delegated attempt
    pub(super) async fn reply(
        &self,
        coordinator: &str,
        op_id: &OpId,
        attempt: u32,
        result: Result<(), FenceError>,
        started: Option<chrono::DateTime<chrono::Utc>>,
    ) {
        let ended = self.clock.utc_now();
        let message = PeerMessage::DelegateReply {
            op_id: op_id.clone(),
            attempt,
            rc: rc_of(&result),
            reason: result.err().map(|e| e.reason()).unwrap_or_default(),
            started: started.unwrap_or(ended),
            ended,
        };
        let _ = self
            .executor
            .execute(Effect::SendPeer {
                peer: coordinator.to_string(),
                message,
            })
            .await;
    }
}
