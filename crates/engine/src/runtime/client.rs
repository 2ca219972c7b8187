// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operations offered to local clients

use super::{jobs, FencerCore, RebootParent, Waiter, Work};
use crate::events::{AgentJob, JobKind};
use fenced_adapters::{AgentAdapter, NotifyAdapter, PeerAdapter};
use fenced_core::{
    Action, Candidate, Clock, DeviceSource, DeviceSpec, Event, FenceError, HistoryRecord, IdGen,
    OpId, Operation, OperationEvent, OperationRequest, PlanInputs, RegisterError,
    RegisterOutcome, TargetSpec, MAX_TIMEOUT,
};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::oneshot;

/// A request to fence (or query) a node
#[derive(Debug, Clone)]
pub struct FenceRequest {
    pub target: String,
    pub action: Action,
    /// Overall budget; the cluster `stonith-timeout`, then the default, when unset
    pub timeout: Option<Duration>,
    /// Treat a success for the same target and action within this window as done
    pub tolerance: Option<Duration>,
    pub origin: String,
    /// Whether the client may use privileged actions (`confirm`)
    pub privileged: bool,
    pub allow_self_fencing: bool,
}

impl FenceRequest {
    pub fn new(target: impl Into<String>, action: Action) -> Self {
        Self {
            target: target.into(),
            action,
            timeout: None,
            tolerance: None,
            origin: "client".to_string(),
            privileged: false,
            allow_self_fencing: false,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub fn allow_self_fencing(mut self) -> Self {
        self.allow_self_fencing = true;
        self
    }
}

/// Final result delivered to everyone waiting on an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceOutcome {
    pub op_id: OpId,
    pub target: String,
    /// `Ok` carries the peer that carried the action out
    pub result: Result<String, FenceError>,
    /// Whether this waiter joined an operation already in flight
    pub merged: bool,
}

/// An accepted request
#[derive(Debug)]
pub struct FenceHandle {
    pub op_id: OpId,
    pub merged: bool,
    pub outcome: oneshot::Receiver<FenceOutcome>,
}

impl FenceHandle {
    /// Wait for the operation to finish
    pub async fn wait(self) -> Result<FenceOutcome, FenceError> {
        let op_id = self.op_id;
        self.outcome
            .await
            .map_err(|_| FenceError::Unknown(format!("operation {op_id} abandoned")))
    }
}

/// Snapshot for `status`
#[derive(Debug, Clone, Serialize)]
pub struct CoreStatus {
    pub node: String,
    pub uptime_secs: u64,
    pub devices: usize,
    pub levels: usize,
    pub operations: usize,
    pub active_peers: Vec<String>,
    pub busy_devices: usize,
}

impl<A, P, N, C, I> FencerCore<A, P, N, C, I>
where
    A: AgentAdapter,
    P: PeerAdapter,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    pub async fn register_device(&self, spec: DeviceSpec) -> Result<RegisterOutcome, RegisterError> {
        let agents = self.executor.agents().clone();
        let (outcome, device, probe) = {
            let mut st = self.lock();
            let id = spec.id.clone();
            let outcome = st
                .registry
                .register(spec, DeviceSource::Api, |agent| agents.is_installed(agent))?;
            // Learn the targets of a list-probed device before anyone asks
            let wants_probe = st
                .registry
                .get(&id)
                .is_some_and(|d| d.needs_probe() && !d.disabled);
            let probe = if wants_probe {
                st.registry.begin_probe(&id)
            } else {
                None
            };
            (outcome, id, probe)
        };
        tracing::info!(device = %device, ?outcome, "device registered");
        self.emit(Event::DeviceRegistered { device }).await;
        self.announce_devices().await;
        if let Some(ticket) = probe {
            if let Err(job) = self.executor.submit(jobs::probe_job(ticket)) {
                let work = self.rejected(job).await;
                self.run(work).await;
            }
        }
        Ok(outcome)
    }

    pub async fn deregister_device(&self, id: &str) -> Result<(), FenceError> {
        self.lock()
            .registry
            .deregister(id)
            .ok_or_else(|| FenceError::Unknown(format!("device {id}")))?;
        tracing::info!(device = id, "device removed");
        self.emit(Event::DeviceRemoved {
            device: id.to_string(),
        })
        .await;
        self.announce_devices().await;
        Ok(())
    }

    pub async fn register_level(
        &self,
        target: TargetSpec,
        index: u8,
        devices: Vec<String>,
    ) -> Result<(), FenceError> {
        {
            let mut st = self.lock();
            st.topology.set_level(target.clone(), index, devices)?;
            // A client registration takes the level over from the configuration
            st.config_levels.remove(&(target.clone(), index));
        }
        self.emit(Event::LevelRegistered {
            target: target.to_string(),
            index,
        })
        .await;
        Ok(())
    }

    pub async fn deregister_level(&self, target: TargetSpec, index: u8) -> Result<(), FenceError> {
        let removed = self.lock().topology.remove_level(&target, index);
        if !removed {
            return Err(FenceError::Unknown(format!("level {index} for {target}")));
        }
        self.emit(Event::LevelRemoved {
            target: target.to_string(),
            index,
        })
        .await;
        Ok(())
    }

    pub fn list_registered(&self) -> Vec<String> {
        self.lock().registry.list()
    }

    pub async fn list_installed(&self) -> Result<Vec<String>, FenceError> {
        self.executor
            .agents()
            .list_installed()
            .await
            .map_err(|e| e.to_fence_error())
    }

    pub async fn metadata(&self, agent: &str, timeout: Duration) -> Result<String, FenceError> {
        self.executor
            .agents()
            .metadata(agent, timeout)
            .await
            .map_err(|e| e.to_fence_error())
    }

    /// Who could run `action` against `target`, best first, from what is
    /// known now. Probes are not waited for.
    pub fn query(&self, target: &str, action: Action) -> Vec<Candidate> {
        let st = self.lock();
        PlanInputs {
            topology: &st.topology,
            registry: &st.registry,
            peers: &st.peers,
        }
        .candidates(target, action, self.clock.now())
    }

    /// Run the device's `monitor` action. The receiver yields its result.
    pub fn device_status(
        &self,
        device: &str,
        timeout: Option<Duration>,
    ) -> Result<oneshot::Receiver<Result<(), FenceError>>, FenceError> {
        if let Some(timeout) = timeout {
            check_timeout(timeout)?;
        }
        let (tx, rx) = oneshot::channel();
        let job = {
            let mut st = self.lock();
            let found = st
                .registry
                .get(device)
                .ok_or_else(|| FenceError::Unknown(format!("device {device}")))?;
            let timeout = timeout.unwrap_or_else(|| found.timeout_for(Action::Monitor));
            let invocation = jobs::invocation(found, Action::Monitor, None, timeout);
            let request = st.next_verify;
            st.next_verify += 1;
            st.verifies.insert(request, tx);
            AgentJob {
                kind: JobKind::Verify { request },
                invocation,
                retries: 0,
            }
        };
        if let Err(job) = self.executor.submit(job) {
            if let JobKind::Verify { request } = job.kind {
                if let Some(tx) = self.lock().verifies.remove(&request) {
                    let _ = tx.send(Err(FenceError::Busy(device.to_string())));
                }
            }
        }
        Ok(rx)
    }

    /// Accept a fencing request. Identical destructive requests in flight are
    /// merged and share one outcome.
    pub async fn fence(&self, request: FenceRequest) -> Result<FenceHandle, FenceError> {
        let target = request.target.trim().to_string();
        let action = request.action;
        if target.is_empty() {
            return Err(FenceError::BadRequest("missing target".to_string()));
        }
        if !action.targets_node() {
            return Err(FenceError::BadRequest(format!("{action} does not act on a node")));
        }
        if action == Action::Confirm && !request.privileged {
            return Err(FenceError::Denied("confirm needs a privileged client".to_string()));
        }

        let (tx, rx) = oneshot::channel();
        let start = {
            let mut guard = self.lock();
            let st = &mut *guard;
            let timeout = request
                .timeout
                .or(st.cluster_timeout)
                .unwrap_or(st.registry.config().default_timeout);
            check_timeout(timeout)?;

            if action.is_destructive() {
                if let Some(existing) = st.active.get(&(target.clone(), action)).cloned() {
                    tracing::info!(op_id = %existing, host = %target, %action, "merged with operation in flight");
                    st.waiters.entry(existing.clone()).or_default().push(Waiter {
                        tx,
                        merged: true,
                    });
                    return Ok(FenceHandle {
                        op_id: existing,
                        merged: true,
                        outcome: rx,
                    });
                }
            }

            let id = self.id_gen.next();
            let op_request = OperationRequest {
                target: target.clone(),
                action,
                timeout,
                origin: request.origin.clone(),
                allow_self_fencing: request.allow_self_fencing,
            };
            let within_tolerance = request.tolerance.is_some_and(|window| {
                self.executor
                    .history()
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .recent_success(&target, action, window, self.clock.utc_now())
                    .is_some()
            });

            let start_id = if action == Action::Reboot
                && !within_tolerance
                && !self.reboot_capable(st, &target)
            {
                tracing::info!(op_id = %id, host = %target, "no reboot-capable device, rebooting as off then on");
                let mut off = op_request.clone();
                off.action = Action::Off;
                st.reboots.insert(
                    id.clone(),
                    RebootParent {
                        request: op_request,
                        deadline: self.clock.now() + timeout,
                        started: self.clock.utc_now(),
                        off_delegate: None,
                    },
                );
                let off_id = OpId(format!("{id}.off"));
                let op = Operation::new(off_id.clone(), off, self.node.clone(), &self.clock);
                st.operations.insert(off_id.clone(), op);
                st.parents.insert(off_id.clone(), id.clone());
                off_id
            } else {
                let op = Operation::new(id.clone(), op_request, self.node.clone(), &self.clock);
                st.operations.insert(id.clone(), op);
                id.clone()
            };
            if action.is_destructive() {
                st.active.insert((target.clone(), action), id.clone());
            }
            st.waiters.entry(id.clone()).or_default().push(Waiter { tx, merged: false });
            tracing::info!(op_id = %id, host = %target, %action, origin = %request.origin, ?timeout, "fence requested");
            (id, start_id)
        };

        let (id, start_id) = start;
        self.run(vec![Work::Start {
            id: start_id,
            tolerance: request.tolerance,
        }])
        .await;
        Ok(FenceHandle {
            op_id: id,
            merged: false,
            outcome: rx,
        })
    }

    /// Whether any device, here or at a peer, could reboot `target` directly.
    /// Devices still waiting for a probe count as capable.
    fn reboot_capable(&self, st: &super::CoreState, target: &str) -> bool {
        let now = self.clock.now();
        !st.registry.ranked(target, Action::Reboot, now).is_empty()
            || !st.registry.needs_probe(Action::Reboot, now).is_empty()
            || st.peers.any_supports(target, Action::Reboot)
    }

    /// Cancel an operation that has not been handed to an agent yet (or a
    /// non-destructive one at any point)
    pub async fn cancel(&self, op_id: &OpId) -> Result<(), FenceError> {
        let id = {
            let st = self.lock();
            // A decomposed reboot is cancelled through its running half
            let id = if st.reboots.contains_key(op_id) {
                st.parents
                    .iter()
                    .find(|(_, parent)| *parent == op_id)
                    .map(|(child, _)| child.clone())
                    .ok_or_else(|| FenceError::Unknown(format!("operation {op_id}")))?
            } else {
                op_id.clone()
            };
            let op = st
                .operations
                .get(&id)
                .ok_or_else(|| FenceError::Unknown(format!("operation {op_id}")))?;
            if !op.can_cancel() {
                return Err(FenceError::NotSupported(format!(
                    "{} of {} can no longer be cancelled",
                    op.action, op.target
                )));
            }
            id
        };
        tracing::info!(op_id = %op_id, "cancel requested");
        self.run(vec![Work::Event(id, OperationEvent::Cancel)]).await;
        Ok(())
    }

    /// History, newest last
    pub fn history(&self, target: Option<&str>) -> Vec<HistoryRecord> {
        let history = self.executor.history();
        let store = history.lock().unwrap_or_else(|e| e.into_inner());
        match target {
            Some(target) => store.for_target(target),
            None => store.all(),
        }
    }

    pub fn status(&self) -> CoreStatus {
        let st = self.lock();
        CoreStatus {
            node: self.node.clone(),
            uptime_secs: self
                .clock
                .now()
                .saturating_duration_since(self.started_at)
                .as_secs(),
            devices: st.registry.len(),
            levels: st.topology.all().len(),
            operations: st.operations.len(),
            active_peers: st.peers.active_peers(),
            busy_devices: self.executor.active_devices(),
        }
    }
}

/// Client timeouts must be positive and no longer than [`MAX_TIMEOUT`]
fn check_timeout(timeout: Duration) -> Result<(), FenceError> {
    if timeout.is_zero() {
        return Err(FenceError::BadRequest("timeout must be positive".to_string()));
    }
    if timeout > MAX_TIMEOUT {
        return Err(FenceError::BadRequest(format!(
            "timeout {}s exceeds {}s",
            timeout.as_secs(),
            MAX_TIMEOUT.as_secs()
        )));
    }
    Ok(())
}
