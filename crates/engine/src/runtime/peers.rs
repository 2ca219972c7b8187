// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer traffic, membership changes and the periodic tick

use super::{jobs, CoreState, DelegatedJob, FenceRequest, FencerCore, Work, TICK_TIMER};
use crate::events::{AgentJob, JobKind};
use fenced_adapters::{AgentAdapter, NotifyAdapter, PeerAdapter};
use fenced_core::{
    Action, Clock, Effect, Event, FenceError, HistoryRecord, HistoryState, IdGen, OpId,
    OperationEvent, PeerMessage,
};
use std::time::Duration;

/// Origin recorded on operations the fencer starts by itself
pub const UNFENCE_ORIGIN: &str = "fenced:unfence";

impl<A, P, N, C, I> FencerCore<A, P, N, C, I>
where
    A: AgentAdapter,
    P: PeerAdapter,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    pub(super) async fn on_peer_message(&self, from: String, message: PeerMessage) {
        if from == self.node {
            return;
        }
        let now = self.clock.now();
        let joined = {
            let mut st = self.lock();
            match &message {
                PeerMessage::DeviceGossip {
                    device_ids,
                    epoch,
                    adverts,
                    ..
                } => st.peers.apply_gossip(
                    &from,
                    device_ids.iter().cloned().collect(),
                    adverts.clone(),
                    *epoch,
                    now,
                ),
                _ => st.peers.observe(&from, now),
            }
        };
        if joined {
            self.peer_joined(&from).await;
        }

        match message {
            PeerMessage::DeviceGossip { .. } => {}
            PeerMessage::DelegateRequest {
                op_id,
                attempt,
                target,
                action,
                device,
                deadline,
                allow_self_fencing,
            } => {
                let request = Delegation {
                    op_id,
                    attempt,
                    target,
                    action,
                    device,
                    deadline,
                    allow_self_fencing,
                };
                self.delegated_request(from, request).await;
            }
            PeerMessage::DelegateReply {
                op_id,
                attempt,
                rc,
                reason,
                started,
                ended,
            } => {
                let expected = self
                    .lock()
                    .operations
                    .get(&op_id)
                    .and_then(|op| op.current_attempt())
                    .is_some_and(|a| a.seq == attempt && a.peer == from);
                let result = match FenceError::from_rc(rc, reason) {
                    None => Ok(()),
                    Some(e) => Err(e),
                };
                if !expected {
                    let Some(mut record) = self.late_reply_record(&from, &op_id, attempt) else {
                        tracing::debug!(op_id = %op_id, attempt, peer = %from, "ignoring stale delegate reply");
                        return;
                    };
                    match &result {
                        Ok(()) => {
                            tracing::warn!(op_id = %op_id, attempt, peer = %from, host = %record.target, "late delegate reply reports success");
                            record.state = HistoryState::Success;
                            record.delegate = Some(from);
                        }
                        Err(e) => {
                            tracing::info!(op_id = %op_id, attempt, peer = %from, error = %e, "late delegate reply");
                            record.state = HistoryState::Failure;
                            record.rc = e.rc();
                            record.reason = Some(e.reason());
                        }
                    }
                    record.started = started;
                    record.ended = Some(ended);
                    let _ = self
                        .executor
                        .execute(Effect::RecordHistory { record })
                        .await;
                    return;
                }
                self.run(vec![Work::Event(
                    op_id,
                    OperationEvent::AttemptFinished { attempt, result },
                )])
                .await;
            }
            PeerMessage::CancelRequest { op_id, attempt } => {
                let kind = JobKind::Delegated {
                    coordinator: from,
                    op_id,
                    attempt,
                };
                let device = self
                    .lock()
                    .delegated
                    .get(&kind)
                    .map(|job| job.device.clone());
                let Some(device) = device else {
                    return;
                };
                // Only a queued attempt is withdrawn; one already running
                // is left to finish and report
                if let Some(crate::RuntimeEvent::AgentFinished {
                    kind,
                    device,
                    action,
                    result,
                }) = self.executor.cancel_job(&device, kind, false)
                {
                    let work = self.job_finished(kind, device, action, result).await;
                    self.run(work).await;
                }
            }
            PeerMessage::HistoryAppend { record } => self.absorb_history(vec![record]),
            PeerMessage::HistorySyncReq { since, .. } => {
                let records = self
                    .executor
                    .history()
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .since(since);
                let _ = self
                    .executor
                    .execute(Effect::SendPeer {
                        peer: from,
                        message: PeerMessage::HistorySyncResp { records },
                    })
                    .await;
            }
            PeerMessage::HistorySyncResp { records } => self.absorb_history(records),
        }
    }

    /// Skeleton history entry for a reply to an attempt its operation has
    /// moved past. The attempt gets its own id so the operation's record
    /// stays as it is.
    fn late_reply_record(&self, from: &str, op_id: &OpId, attempt: u32) -> Option<HistoryRecord> {
        let in_flight = self.lock().operations.get(op_id).map(|op| {
            op.attempts
                .iter()
                .any(|a| a.seq == attempt && a.peer == from)
                .then(|| op.history_record(HistoryState::Pending, None, None, None))
        });
        let base = match in_flight {
            Some(record) => record,
            None => self
                .executor
                .history()
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(op_id)
                .filter(|r| r.coordinator == self.node)
                .cloned(),
        }?;
        Some(HistoryRecord {
            op_id: OpId(format!("{op_id}/{attempt}")),
            delegate: None,
            rc: 0,
            reason: None,
            ..base
        })
    }

    fn absorb_history(&self, records: Vec<HistoryRecord>) {
        let history = self.executor.history();
        let mut store = history.lock().unwrap_or_else(|e| e.into_inner());
        for record in records {
            store.append(record);
        }
    }

    /// Run an attempt another peer coordinates, or refuse it right away
    async fn delegated_request(&self, coordinator: String, request: Delegation) {
        let started = self.clock.utc_now();
        let kind = JobKind::Delegated {
            coordinator: coordinator.clone(),
            op_id: request.op_id.clone(),
            attempt: request.attempt,
        };
        let job = {
            let mut st = self.lock();
            match st.registry.get(&request.device) {
                None => Err(FenceError::Unknown(format!(
                    "device {} on {}",
                    request.device, self.node
                ))),
                Some(_)
                    if jobs::self_fence_denied(
                        &self.node,
                        &request.target,
                        request.action,
                        &request.device,
                        request.allow_self_fencing,
                    ) =>
                {
                    Err(FenceError::Denied(format!("{} will not fence itself", self.node)))
                }
                Some(device) if device.disabled => {
                    Err(FenceError::NotSupported(format!("device {} is disabled", device.id)))
                }
                Some(device) => {
                    let job = AgentJob {
                        kind: kind.clone(),
                        invocation: jobs::invocation(
                            device,
                            request.action,
                            Some(&request.target),
                            request.deadline,
                        ),
                        retries: device.retries_for(request.action),
                    };
                    st.delegated.insert(
                        kind,
                        DelegatedJob {
                            device: request.device.clone(),
                            started,
                        },
                    );
                    Ok(job)
                }
            }
        };
        tracing::info!(
            op_id = %request.op_id,
            coordinator = %coordinator,
            device = %request.device,
            action = %request.action,
            accepted = job.is_ok(),
            "delegated attempt"
        );
        match job {
            Ok(job) => {
                if let Err(job) = self.executor.submit(job) {
                    self.rejected(job).await;
                }
            }
            Err(e) => {
                self.reply(&coordinator, &request.op_id, request.attempt, Err(e), Some(started))
                    .await;
            }
        }
    }

    /// Transport reported a peer unreachable
    pub(super) async fn on_peer_failed(&self, peer: &str) {
        let lost = self.lock().peers.mark_lost(peer);
        if lost {
            let work = self.peer_lost(peer).await;
            self.run(work).await;
        }
    }

    async fn peer_joined(&self, peer: &str) {
        tracing::info!(peer, "peer joined");
        let (gossip, since, unfence) = {
            let st = self.lock();
            let since = self
                .executor
                .history()
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .high_water_mark();
            (
                self.gossip_message(&st, true),
                since,
                self.should_unfence(&st, peer),
            )
        };
        let _ = self
            .executor
            .execute_all(vec![
                Effect::SendPeer {
                    peer: peer.to_string(),
                    message: gossip,
                },
                Effect::SendPeer {
                    peer: peer.to_string(),
                    message: PeerMessage::HistorySyncReq {
                        peer: self.node.clone(),
                        since,
                    },
                },
            ])
            .await;
        self.emit(Event::PeerJoined {
            peer: peer.to_string(),
        })
        .await;

        if unfence {
            let request = FenceRequest::new(peer, Action::On).origin(UNFENCE_ORIGIN);
            match self.fence(request).await {
                Ok(handle) => tracing::info!(peer, op_id = %handle.op_id, "unfencing rejoined peer"),
                Err(e) => tracing::warn!(peer, error = %e, "could not start unfencing"),
            }
        }
    }

    /// Unfencing is started by one survivor only: the lowest-named active
    /// peer other than the one that joined.
    fn should_unfence(&self, st: &CoreState, joined: &str) -> bool {
        if !st.registry.has_unfencing_device() && !st.peers.any_unfencing() {
            return false;
        }
        st.peers
            .active_peers()
            .iter()
            .filter(|p| p.as_str() != joined)
            .all(|p| p.as_str() > self.node.as_str())
    }

    /// Fail over every operation that was waiting on a lost peer
    async fn peer_lost(&self, peer: &str) -> Vec<Work> {
        tracing::warn!(peer, "peer lost");
        self.emit(Event::PeerLost {
            peer: peer.to_string(),
        })
        .await;
        let st = self.lock();
        let mut ids: Vec<&OpId> = st
            .operations
            .iter()
            .filter(|(_, op)| !op.is_terminal())
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids.into_iter()
            .map(|id| {
                Work::Event(
                    id.clone(),
                    OperationEvent::PeerLost {
                        peer: peer.to_string(),
                    },
                )
            })
            .collect()
    }

    /// Expire silent peers, gossip, refresh probes and re-arm
    pub(super) async fn tick(&self) {
        let now = self.clock.now();
        let (lost, gossip, probes, unsent) = {
            let mut guard = self.lock();
            let st = &mut *guard;
            let lost = st.peers.expire(now);
            let gossip = self.gossip(st);
            let mut probes = Vec::new();
            for id in st.registry.stale_probes(now) {
                if let Some(ticket) = st.registry.begin_probe(&id) {
                    probes.push(jobs::probe_job(ticket));
                }
            }
            let unsent = std::mem::take(&mut st.unsent_history);
            (lost, gossip, probes, unsent)
        };

        let mut work = Vec::new();
        for peer in lost {
            work.extend(self.peer_lost(&peer).await);
        }
        let _ = self
            .executor
            .execute(Effect::Broadcast { message: gossip })
            .await;
        for job in probes {
            if let Err(job) = self.executor.submit(job) {
                work.extend(self.rejected(job).await);
            }
        }
        for record in unsent {
            let message = PeerMessage::HistoryAppend {
                record: record.clone(),
            };
            if self
                .executor
                .execute(Effect::Broadcast { message })
                .await
                .is_err()
            {
                self.lock().unsent_history.push(record);
            }
        }
        let _ = self
            .executor
            .execute(Effect::SetTimer {
                id: TICK_TIMER.to_string(),
                duration: self.gossip_interval,
            })
            .await;
        self.run(work).await;
    }
}

/// Fields of a `DelegateRequest`
struct Delegation {
    op_id: OpId,
    attempt: u32,
    target: String,
    action: Action,
    device: String,
    deadline: Duration,
    allow_self_fencing: bool,
}
