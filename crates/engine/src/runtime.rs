// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime of the fencer
//!
//! [`FencerCore`] owns the device registry, topology, peer directory and the
//! in-flight operations behind one coarse lock. Every handler takes the lock
//! only to run state transitions; the effects those produce are carried out
//! after it is released.

mod client;
mod config;
mod jobs;
mod peers;

pub use client::{CoreStatus, FenceHandle, FenceOutcome, FenceRequest};
pub use config::ConfigDelta;
pub use peers::UNFENCE_ORIGIN;

use crate::error::RuntimeError;
use crate::events::{AgentJob, JobKind, RuntimeEvent};
use crate::executor::{ExecuteError, Executor, ExecutorDeps};
use crate::Scheduler;
use chrono::{DateTime, Utc};
use fenced_adapters::{AgentAdapter, NotifyAdapter, PeerAdapter};
use fenced_core::operation::timer::{self, OpTimer};
use fenced_core::{
    Action, Clock, DeviceRegistry, Effect, Event, FenceError, HistoryRecord, HistoryState,
    HostInfo, IdGen, OpId, Operation, OperationEvent, OperationRequest, OperationState,
    PeerDirectory, PeerMessage, PlanInputs, RegistryConfig, TargetSpec, TopologyTable,
};
use fenced_storage::HistoryStore;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

/// Timer driving gossip, peer expiry and probe refresh
pub const TICK_TIMER: &str = "fencer:tick";

/// Gossip intervals a peer may stay silent before it counts as lost
pub const MISSED_GOSSIP_LIMIT: u32 = 3;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Name of the local peer
    pub node: String,
    pub registry: RegistryConfig,
    pub gossip_interval: Duration,
    /// History records kept per target
    pub history_cap: usize,
}

impl RuntimeConfig {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            registry: RegistryConfig::default(),
            gossip_interval: Duration::from_secs(10),
            history_cap: fenced_storage::DEFAULT_CAP,
        }
    }
}

/// Runtime adapter dependencies
pub struct RuntimeDeps<A, P, N> {
    pub agents: A,
    pub peers: P,
    pub notify: N,
    /// Where agent completions and other async results are posted
    pub events: mpsc::Sender<RuntimeEvent>,
}

/// Unit of work of one [`FencerCore::run`] pass
#[derive(Debug)]
enum Work {
    Event(OpId, OperationEvent),
    /// Start a freshly created operation
    Start {
        id: OpId,
        tolerance: Option<Duration>,
    },
    /// Plan an operation once its capability probes are in
    Plan(OpId),
}

/// What a transition asks the runtime to do
enum Step {
    Effect(Effect),
    Run(AgentJob),
    Work(Work),
}

struct Waiter {
    tx: oneshot::Sender<FenceOutcome>,
    merged: bool,
}

/// A reboot carried out as `off` followed by `on`
struct RebootParent {
    request: OperationRequest,
    deadline: Instant,
    started: DateTime<Utc>,
    off_delegate: Option<String>,
}

/// A job another peer delegated to us
struct DelegatedJob {
    device: String,
    started: DateTime<Utc>,
}

struct CoreState {
    registry: DeviceRegistry,
    topology: TopologyTable,
    peers: PeerDirectory,
    /// Node facts from the configuration, for topology matching
    hosts: BTreeMap<String, HostInfo>,
    operations: HashMap<OpId, Operation>,
    /// In-flight destructive requests by fingerprint
    active: HashMap<(String, Action), OpId>,
    waiters: HashMap<OpId, Vec<Waiter>>,
    /// Devices each querying operation still waits on
    awaiting_probes: HashMap<OpId, BTreeSet<String>>,
    reboots: HashMap<OpId, RebootParent>,
    /// Child operation -> reboot parent
    parents: HashMap<OpId, OpId>,
    delegated: HashMap<JobKind, DelegatedJob>,
    verifies: HashMap<u64, oneshot::Sender<Result<(), FenceError>>>,
    next_verify: u64,
    gossip_epoch: u64,
    gossip_dirty: bool,
    /// Terminal records whose broadcast failed
    unsent_history: Vec<HistoryRecord>,
    /// Levels owned by the configuration
    config_levels: BTreeSet<(TargetSpec, u8)>,
    /// `stonith-timeout` from the configuration
    cluster_timeout: Option<Duration>,
}

/// The fencer: tables, operations and the executor that acts for them
pub struct FencerCore<A, P, N, C: Clock, I: IdGen> {
    node: String,
    gossip_interval: Duration,
    executor: Executor<A, P, N, C>,
    state: Mutex<CoreState>,
    clock: C,
    id_gen: I,
    started_at: Instant,
}

impl<A, P, N, C, I> FencerCore<A, P, N, C, I>
where
    A: AgentAdapter,
    P: PeerAdapter,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    pub fn new(deps: RuntimeDeps<A, P, N>, config: RuntimeConfig, clock: C, id_gen: I) -> Self {
        let history = Arc::new(Mutex::new(HistoryStore::new(config.history_cap)));
        let executor = Executor::new(
            ExecutorDeps {
                agents: deps.agents,
                peers: deps.peers,
                notify: deps.notify,
                history,
                events: deps.events,
            },
            Arc::new(Mutex::new(Scheduler::new())),
            clock.clone(),
        );
        let lost_after = config.gossip_interval * MISSED_GOSSIP_LIMIT;
        // Epochs start from the wall clock so a restarted peer is not
        // mistaken for a stale one
        let epoch = u64::try_from(clock.utc_now().timestamp_millis()).unwrap_or(0);
        let state = CoreState {
            registry: DeviceRegistry::new(config.registry),
            topology: TopologyTable::new(),
            peers: PeerDirectory::new(config.node.clone(), lost_after),
            hosts: BTreeMap::new(),
            operations: HashMap::new(),
            active: HashMap::new(),
            waiters: HashMap::new(),
            awaiting_probes: HashMap::new(),
            reboots: HashMap::new(),
            parents: HashMap::new(),
            delegated: HashMap::new(),
            verifies: HashMap::new(),
            next_verify: 1,
            gossip_epoch: epoch,
            gossip_dirty: true,
            unsent_history: Vec::new(),
            config_levels: BTreeSet::new(),
            cluster_timeout: None,
        };
        Self {
            node: config.node,
            gossip_interval: config.gossip_interval,
            executor,
            state: Mutex::new(state),
            started_at: clock.now(),
            clock,
            id_gen,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Announce ourselves and arm the periodic tick
    pub async fn start(&self) -> Result<(), RuntimeError> {
        let gossip = {
            let mut st = self.lock();
            self.gossip(&mut st)
        };
        tracing::info!(node = %self.node, "fencer started");
        self.executor
            .execute_all(vec![
                Effect::SetTimer {
                    id: TICK_TIMER.to_string(),
                    duration: self.gossip_interval,
                },
                Effect::Broadcast { message: gossip },
            ])
            .await?;
        Ok(())
    }

    /// Handle an asynchronous result posted to the event channel
    pub async fn handle(&self, event: RuntimeEvent) {
        tracing::trace!(event = event.name(), "handling");
        match event {
            RuntimeEvent::AgentStarted {
                kind: JobKind::Attempt { op_id, attempt },
                ..
            } => {
                self.run(vec![Work::Event(
                    op_id,
                    OperationEvent::AttemptStarted { attempt },
                )])
                .await;
            }
            RuntimeEvent::AgentStarted { kind, device } => {
                tracing::debug!(job = kind.label(), device, "job started");
            }
            RuntimeEvent::AgentFinished {
                kind,
                device,
                action,
                result,
            } => {
                let work = self.job_finished(kind, device, action, result).await;
                self.run(work).await;
            }
            RuntimeEvent::Peer { from, message } => self.on_peer_message(from, message).await,
            RuntimeEvent::PeerFailed { peer } => self.on_peer_failed(&peer).await,
        }
    }

    /// When the next timer is due
    pub fn next_deadline(&self) -> Option<Instant> {
        self.executor
            .scheduler()
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .next_deadline()
    }

    /// Fire every timer due now
    pub async fn fire_timers(&self) {
        let now = self.clock.now();
        let fired = self
            .executor
            .scheduler()
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fired_timers(now);
        let mut work = Vec::new();
        for id in fired {
            match timer::parse(&id) {
                Some(OpTimer::Deadline(op_id)) => {
                    work.push(Work::Event(op_id, OperationEvent::DeadlineExpired));
                }
                Some(OpTimer::Remote(op_id, attempt)) => {
                    work.push(Work::Event(op_id, OperationEvent::RemoteTimeout { attempt }));
                }
                None if id == TICK_TIMER => self.tick().await,
                None => tracing::debug!(timer = %id, "unknown timer fired"),
            }
        }
        self.run(work).await;
    }

    /// Process work until nothing follows from it
    async fn run(&self, work: Vec<Work>) {
        let mut queue: VecDeque<Work> = work.into();
        while let Some(item) = queue.pop_front() {
            let (settle, steps) = {
                let mut st = self.lock();
                match item {
                    Work::Event(id, event) => {
                        let steps = self.advance(&mut st, &id, event);
                        (Some(id), steps)
                    }
                    Work::Start { id, tolerance } => (None, self.begin(&mut st, &id, tolerance)),
                    Work::Plan(id) => (None, self.plan(&mut st, &id)),
                }
            };
            for step in steps {
                self.perform(step, &mut queue).await;
            }
            if let Some(id) = settle {
                self.settle(&id, &mut queue).await;
            }
        }
    }

    /// Feed one event to an operation and translate what it asks for
    fn advance(&self, st: &mut CoreState, id: &OpId, event: OperationEvent) -> Vec<Step> {
        let Some(op) = st.operations.get(id) else {
            tracing::debug!(op_id = %id, ?event, "event for unknown operation");
            return Vec::new();
        };
        let (next, effects) = op.transition(event, &self.clock);
        st.operations.insert(id.clone(), next);
        effects
            .into_iter()
            .map(|effect| self.prepare(st, effect))
            .collect()
    }

    /// Resolve agent runs against the registry as it is now; the job keeps
    /// that snapshot even if the device is replaced later
    fn prepare(&self, st: &mut CoreState, effect: Effect) -> Step {
        let (op_id, attempt, device, action, target, timeout) = match effect {
            Effect::RunAgent {
                op_id,
                attempt,
                device,
                action,
                target,
                timeout,
            } => (op_id, attempt, device, action, target, timeout),
            other => return Step::Effect(other),
        };

        let allow = st
            .operations
            .get(&op_id)
            .is_some_and(|op| op.allow_self_fencing);
        if jobs::self_fence_denied(&self.node, &target, action, &device, allow) {
            let reason = format!("{} will not {action} itself with {device}", self.node);
            return Step::Work(Work::Event(
                op_id,
                OperationEvent::AttemptFinished {
                    attempt,
                    result: Err(FenceError::Denied(reason)),
                },
            ));
        }

        match st.registry.get(&device) {
            Some(found) => Step::Run(AgentJob {
                kind: JobKind::Attempt { op_id, attempt },
                invocation: jobs::invocation(found, action, Some(&target), timeout),
                retries: found.retries_for(action),
            }),
            None => Step::Work(Work::Event(
                op_id,
                OperationEvent::AttemptFinished {
                    attempt,
                    result: Err(FenceError::Unknown(format!("device {device}"))),
                },
            )),
        }
    }

    async fn perform(&self, step: Step, queue: &mut VecDeque<Work>) {
        match step {
            Step::Work(work) => queue.push_back(work),
            Step::Run(job) => {
                if let Err(job) = self.executor.submit(job) {
                    tracing::warn!(device = job.device(), job = job.kind.label(), "device queue full");
                    queue.extend(self.rejected(job).await);
                }
            }
            Step::Effect(effect) => {
                let unsent = match &effect {
                    Effect::RecordHistory { record } if record.is_terminal() => Some(record.clone()),
                    _ => None,
                };
                let delegation = match &effect {
                    Effect::SendPeer {
                        peer,
                        message: PeerMessage::DelegateRequest { op_id, attempt, .. },
                    } => Some((op_id.clone(), *attempt, peer.clone())),
                    _ => None,
                };
                match self.executor.execute(effect).await {
                    Ok(Some(event)) => queue.extend(self.feedback(event)),
                    Ok(None) => {}
                    Err(ExecuteError::Peer(e)) => {
                        if let Some(record) = unsent {
                            self.lock().unsent_history.push(record);
                        }
                        if let Some((op_id, attempt, peer)) = delegation {
                            queue.push_back(Work::Event(
                                op_id,
                                OperationEvent::AttemptFinished {
                                    attempt,
                                    result: Err(FenceError::PeerUnavailable(format!("{peer}: {e}"))),
                                },
                            ));
                        }
                    }
                    // Logged by the executor; notifications are best effort
                    Err(_) => {}
                }
            }
        }
    }

    /// Events the executor produced inline (a job cancelled while queued)
    fn feedback(&self, event: RuntimeEvent) -> Vec<Work> {
        match event {
            RuntimeEvent::AgentFinished {
                kind: JobKind::Attempt { op_id, attempt },
                result,
                ..
            } => vec![Work::Event(
                op_id,
                OperationEvent::AttemptFinished {
                    attempt,
                    result: result.map(|_| ()).map_err(|e| e.to_fence_error()),
                },
            )],
            other => {
                tracing::debug!(event = other.name(), "unexpected inline event");
                Vec::new()
            }
        }
    }

    /// First steps of a new operation
    fn begin(&self, st: &mut CoreState, id: &OpId, tolerance: Option<Duration>) -> Vec<Step> {
        let Some(op) = st.operations.get(id) else {
            return Vec::new();
        };
        if op.action == Action::Confirm {
            return vec![Step::Work(Work::Event(id.clone(), OperationEvent::Confirm))];
        }
        if let Some(window) = tolerance {
            let history = self.executor.history();
            let store = history.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(record) =
                store.recent_success(&op.target, op.action, window, self.clock.utc_now())
            {
                let delegate = record
                    .delegate
                    .clone()
                    .unwrap_or_else(|| record.coordinator.clone());
                tracing::info!(
                    op_id = %id,
                    host = %op.target,
                    previous = %record.op_id,
                    "already done within tolerance"
                );
                return vec![Step::Work(Work::Event(
                    id.clone(),
                    OperationEvent::AlreadyDone { delegate },
                ))];
            }
        }
        vec![
            Step::Work(Work::Event(id.clone(), OperationEvent::Query)),
            Step::Work(Work::Plan(id.clone())),
        ]
    }

    /// Probe what needs probing, or hand the operation its plan
    fn plan(&self, st: &mut CoreState, id: &OpId) -> Vec<Step> {
        let now = self.clock.now();
        let Some(op) = st.operations.get(id) else {
            return Vec::new();
        };
        if op.state != OperationState::Querying {
            return Vec::new();
        }
        let (target, action) = (op.target.clone(), op.action);

        let mut steps = Vec::new();
        let mut waiting = BTreeSet::new();
        for device in st.registry.needs_probe(action, now) {
            if let Some(ticket) = st.registry.begin_probe(&device) {
                steps.push(Step::Run(jobs::probe_job(ticket)));
            }
            waiting.insert(device);
        }
        if !waiting.is_empty() {
            tracing::debug!(op_id = %id, devices = ?waiting, "waiting for capability probes");
            st.awaiting_probes.insert(id.clone(), waiting);
            return steps;
        }
        st.awaiting_probes.remove(id);

        let host = st
            .hosts
            .get(&target)
            .cloned()
            .unwrap_or_else(|| HostInfo::named(&target));
        let levels = PlanInputs {
            topology: &st.topology,
            registry: &st.registry,
            peers: &st.peers,
        }
        .plan(&host, action, now);
        tracing::info!(op_id = %id, host = %target, %action, levels = levels.len(), "planned");
        vec![Step::Work(Work::Event(id.clone(), OperationEvent::Plan { levels }))]
    }

    /// Retire an operation that reached a terminal state
    async fn settle(&self, id: &OpId, queue: &mut VecDeque<Work>) {
        let finished = {
            let mut st = self.lock();
            if !st.operations.get(id).is_some_and(Operation::is_terminal) {
                return;
            }
            st.active.retain(|_, op| op != id);
            st.awaiting_probes.remove(id);
            let parent = st.parents.remove(id);
            let waiters = st.waiters.remove(id).unwrap_or_default();
            st.operations.remove(id).map(|op| (op, parent, waiters))
        };
        let Some((op, parent, waiters)) = finished else {
            return;
        };
        let Some(result) = op.result().cloned() else {
            return;
        };
        match &result {
            Ok(delegate) => {
                tracing::info!(op_id = %op.id, host = %op.target, action = %op.action, delegate, "operation succeeded")
            }
            Err(e) => {
                tracing::warn!(op_id = %op.id, host = %op.target, action = %op.action, error = %e, "operation failed")
            }
        }
        match parent {
            Some(parent) => self.child_finished(parent, &op, result, queue).await,
            None => resolve(waiters, &op.id, &op.target, result),
        }
    }

    /// Advance a reboot that runs as `off` then `on`
    async fn child_finished(
        &self,
        parent_id: OpId,
        child: &Operation,
        result: Result<String, FenceError>,
        queue: &mut VecDeque<Work>,
    ) {
        let outcome = {
            let mut guard = self.lock();
            let st = &mut *guard;
            let Some(parent) = st.reboots.get_mut(&parent_id) else {
                return;
            };
            match (child.action, result) {
                (Action::Off, Ok(delegate)) => {
                    parent.off_delegate = Some(delegate);
                    let mut request = parent.request.clone();
                    request.action = Action::On;
                    request.timeout = parent
                        .deadline
                        .saturating_duration_since(self.clock.now())
                        .max(Duration::from_millis(1));
                    let on_id = OpId(format!("{parent_id}.on"));
                    let op = Operation::new(on_id.clone(), request, self.node.clone(), &self.clock);
                    st.operations.insert(on_id.clone(), op);
                    st.parents.insert(on_id.clone(), parent_id.clone());
                    queue.push_back(Work::Start {
                        id: on_id,
                        tolerance: None,
                    });
                    None
                }
                (_, Ok(delegate)) => {
                    let delegate = parent.off_delegate.clone().unwrap_or(delegate);
                    Some(self.close_reboot(st, &parent_id, Ok(delegate)))
                }
                (_, Err(e)) => Some(self.close_reboot(st, &parent_id, Err(e))),
            }
        };
        let Some((effects, waiters, target, result)) = outcome else {
            return;
        };
        for effect in effects {
            self.perform(Step::Effect(effect), queue).await;
        }
        resolve(waiters, &parent_id, &target, result);
    }

    fn close_reboot(
        &self,
        st: &mut CoreState,
        parent_id: &OpId,
        result: Result<String, FenceError>,
    ) -> (Vec<Effect>, Vec<Waiter>, String, Result<String, FenceError>) {
        st.active.retain(|_, op| op != parent_id);
        let waiters = st.waiters.remove(parent_id).unwrap_or_default();
        let Some(parent) = st.reboots.remove(parent_id) else {
            return (Vec::new(), waiters, String::new(), result);
        };
        let (state, delegate, rc, reason) = match &result {
            Ok(delegate) => (HistoryState::Success, Some(delegate.clone()), 0, None),
            Err(e) => (HistoryState::Failure, None, e.rc(), Some(e.reason())),
        };
        let target = parent.request.target.clone();
        let record = HistoryRecord {
            op_id: parent_id.clone(),
            target: target.clone(),
            action: Action::Reboot,
            origin: parent.request.origin.clone(),
            coordinator: self.node.clone(),
            delegate: delegate.clone(),
            state,
            rc,
            reason: reason.clone(),
            started: parent.started,
            ended: Some(self.clock.utc_now()),
        };
        let effects = vec![
            Effect::RecordHistory { record },
            Effect::Emit(Event::OperationFinished {
                op_id: parent_id.clone(),
                target: target.clone(),
                action: Action::Reboot,
                rc,
                reason,
                delegate,
            }),
        ];
        (effects, waiters, target, result)
    }

    /// Full device snapshot when something changed since the last one,
    /// otherwise a heartbeat
    fn gossip(&self, st: &mut CoreState) -> PeerMessage {
        let full = st.gossip_dirty;
        if full {
            st.gossip_epoch += 1;
            st.gossip_dirty = false;
        }
        self.gossip_message(st, full)
    }

    fn gossip_message(&self, st: &CoreState, full: bool) -> PeerMessage {
        let now = self.clock.now();
        PeerMessage::DeviceGossip {
            peer: self.node.clone(),
            device_ids: st
                .registry
                .devices()
                .filter(|d| !d.disabled)
                .map(|d| d.id.clone())
                .collect(),
            epoch: st.gossip_epoch,
            adverts: full.then(|| st.registry.adverts(now)),
        }
    }

    /// Tell the peers about a registry change right away
    async fn announce_devices(&self) {
        let gossip = {
            let mut st = self.lock();
            st.gossip_dirty = true;
            self.gossip(&mut st)
        };
        let _ = self
            .executor
            .execute(Effect::Broadcast { message: gossip })
            .await;
    }

    async fn emit(&self, event: Event) {
        let _ = self.executor.execute(Effect::Emit(event)).await;
    }
}

fn resolve(waiters: Vec<Waiter>, op_id: &OpId, target: &str, result: Result<String, FenceError>) {
    for waiter in waiters {
        let outcome = FenceOutcome {
            op_id: op_id.clone(),
            target: target.to_string(),
            result: result.clone(),
            merged: waiter.merged,
        };
        // The client may have gone away
        let _ = waiter.tx.send(outcome);
    }
}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
