// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fencing operation state machine
//!
//! An operation walks a plan of levels. Each level is an ordered list of
//! attempts that must all succeed; the first failure abandons the level and
//! moves to the next one. Attempts run strictly one at a time, either on a
//! local device (through the agent runner) or delegated to a peer.
//!
//! The machine is pure: the runtime feeds it [`OperationEvent`]s and carries
//! out the returned [`Effect`]s. Every attempt has a sequence number so late
//! replies for an abandoned attempt are ignored.

use crate::action::Action;
use crate::clock::Clock;
use crate::device::MAX_TIMEOUT;
use crate::effect::Effect;
use crate::error::FenceError;
use crate::event::Event;
use crate::history::{HistoryRecord, HistoryState};
use crate::id::OpId;
use crate::message::PeerMessage;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Extra time granted to a delegated attempt before giving up on the peer
pub const REMOTE_GRACE: Duration = Duration::from_secs(5);

/// One device invocation within a level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub level: u8,
    pub device: String,
    /// Peer that runs the device
    pub peer: String,
    /// Device timeout for the action
    pub timeout: Duration,
}

/// A level of the plan; index 0 marks a level synthesized without topology
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLevel {
    pub index: u8,
    pub attempts: Vec<Attempt>,
}

impl PlannedLevel {
    /// Attempts run sequentially, so a level needs the sum of its timeouts
    pub fn budget(&self) -> Duration {
        self.attempts
            .iter()
            .fold(Duration::ZERO, |sum, a| sum.saturating_add(a.timeout))
    }
}

/// `start + budget`, with the budget held to [`MAX_TIMEOUT`]
fn deadline_after(start: Instant, budget: Duration) -> Instant {
    start.checked_add(budget.min(MAX_TIMEOUT)).unwrap_or(start)
}

/// Outcome of one attempt as seen by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub seq: u32,
    pub level: u8,
    pub device: String,
    pub peer: String,
    pub deadline: Instant,
    pub result: Option<Result<(), FenceError>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Intake,
    /// Waiting for capability probes before planning
    Querying,
    /// Attempt handed to a device queue, not started yet
    Dispatched { attempt: u32 },
    Executing { attempt: u32 },
    Cancelling { attempt: u32 },
    /// Terminal; `Ok` carries the delegate
    Done { result: Result<String, FenceError> },
    /// Folded into an identical in-flight operation
    Merged { into: OpId },
}

#[derive(Debug, Clone)]
pub enum OperationEvent {
    /// Start resolving candidates
    Query,
    /// Candidate resolution finished
    Plan { levels: Vec<PlannedLevel> },
    /// An identical destructive operation is already running
    Merge { into: OpId },
    /// Administrative confirmation; no device runs
    Confirm,
    /// A recent success makes the request moot
    AlreadyDone { delegate: String },
    AttemptStarted { attempt: u32 },
    AttemptFinished {
        attempt: u32,
        result: Result<(), FenceError>,
    },
    RemoteTimeout { attempt: u32 },
    PeerLost { peer: String },
    Cancel,
    DeadlineExpired,
}

/// Parameters of a new operation
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub target: String,
    pub action: Action,
    pub timeout: Duration,
    pub origin: String,
    pub allow_self_fencing: bool,
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub id: OpId,
    pub target: String,
    pub action: Action,
    pub origin: String,
    /// Local peer, the coordinator
    pub coordinator: String,
    pub requested_timeout: Duration,
    pub allow_self_fencing: bool,
    pub created_at: Instant,
    pub started: DateTime<Utc>,
    pub deadline: Instant,
    pub levels: Vec<PlannedLevel>,
    pub level_pos: usize,
    pub device_pos: usize,
    pub attempts: Vec<AttemptRecord>,
    pub state: OperationState,
    /// Reason of the failing attempt of each abandoned level
    pub failures: Vec<String>,
}

impl Operation {
    pub fn new(
        id: OpId,
        request: OperationRequest,
        coordinator: impl Into<String>,
        clock: &impl Clock,
    ) -> Self {
        let now = clock.now();
        Operation {
            id,
            target: request.target,
            action: request.action,
            origin: request.origin,
            coordinator: coordinator.into(),
            requested_timeout: request.timeout,
            allow_self_fencing: request.allow_self_fencing,
            created_at: now,
            started: clock.utc_now(),
            deadline: deadline_after(now, request.timeout),
            levels: Vec::new(),
            level_pos: 0,
            device_pos: 0,
            attempts: Vec::new(),
            state: OperationState::Intake,
            failures: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            OperationState::Done { .. } | OperationState::Merged { .. }
        )
    }

    pub fn result(&self) -> Option<&Result<String, FenceError>> {
        match &self.state {
            OperationState::Done { result } => Some(result),
            _ => None,
        }
    }

    pub fn current_attempt(&self) -> Option<&AttemptRecord> {
        match self.state {
            OperationState::Dispatched { attempt }
            | OperationState::Executing { attempt }
            | OperationState::Cancelling { attempt } => {
                self.attempts.iter().find(|a| a.seq == attempt)
            }
            _ => None,
        }
    }

    /// Client cancellation is refused for destructive actions once dispatched
    pub fn can_cancel(&self) -> bool {
        match self.state {
            OperationState::Intake | OperationState::Querying => true,
            OperationState::Dispatched { .. } | OperationState::Executing { .. } => {
                !self.action.is_destructive()
            }
            _ => false,
        }
    }

    /// Pure transition function - returns new state and effects
    pub fn transition(&self, event: OperationEvent, clock: &impl Clock) -> (Operation, Vec<Effect>) {
        let now = clock.now();
        let mut op = self.clone();
        let mut effects = Vec::new();

        match (&self.state, event) {
            (OperationState::Intake, OperationEvent::Query) => {
                op.state = OperationState::Querying;
                effects.push(Effect::SetTimer {
                    id: timer::deadline(&op.id),
                    duration: op.requested_timeout.min(MAX_TIMEOUT),
                });
                effects.push(Effect::Emit(Event::OperationStarted {
                    op_id: op.id.clone(),
                    target: op.target.clone(),
                    action: op.action,
                }));
            }

            (OperationState::Intake, OperationEvent::Merge { into }) => {
                op.state = OperationState::Merged { into };
            }

            (OperationState::Intake, OperationEvent::Confirm) => {
                op.action = Action::Off;
                let delegate = op.coordinator.clone();
                op.finish(Ok(delegate), clock, &mut effects);
            }

            (
                OperationState::Intake | OperationState::Querying,
                OperationEvent::AlreadyDone { delegate },
            ) => {
                op.state = OperationState::Done {
                    result: Ok(delegate.clone()),
                };
                effects.push(Effect::CancelTimer {
                    id: timer::deadline(&op.id),
                });
                effects.push(op.finished_event(Some(delegate)));
            }

            (OperationState::Querying, OperationEvent::Plan { levels }) => {
                op.levels = levels
                    .into_iter()
                    .filter(|l| !l.attempts.is_empty())
                    .collect();
                if op.levels.is_empty() {
                    op.finish(Err(FenceError::NoDevices), clock, &mut effects);
                } else {
                    let budget = op
                        .levels
                        .iter()
                        .fold(Duration::ZERO, |sum, l| sum.saturating_add(l.budget()));
                    let limit = deadline_after(op.created_at, op.requested_timeout);
                    op.deadline = deadline_after(now, budget).min(limit);
                    effects.push(Effect::SetTimer {
                        id: timer::deadline(&op.id),
                        duration: op.deadline.saturating_duration_since(now),
                    });
                    effects.push(Effect::RecordHistory {
                        record: op.history_record(HistoryState::Pending, None, None, None),
                    });
                    op.dispatch(clock, &mut effects);
                }
            }

            (
                OperationState::Dispatched { attempt: current },
                OperationEvent::AttemptStarted { attempt },
            ) if *current == attempt => {
                op.state = OperationState::Executing { attempt };
            }

            (
                OperationState::Dispatched { attempt: current }
                | OperationState::Executing { attempt: current },
                OperationEvent::AttemptFinished { attempt, result },
            ) if *current == attempt => {
                op.absorb(attempt, result, clock, &mut effects);
            }

            (
                OperationState::Executing { attempt: current },
                OperationEvent::RemoteTimeout { attempt },
            ) if *current == attempt => {
                let peer = op
                    .current_attempt()
                    .map(|a| a.peer.clone())
                    .unwrap_or_default();
                op.absorb(
                    attempt,
                    Err(FenceError::Timeout(format!("no reply from {peer}"))),
                    clock,
                    &mut effects,
                );
            }

            (
                OperationState::Dispatched { attempt } | OperationState::Executing { attempt },
                OperationEvent::PeerLost { peer },
            ) => {
                let attempt = *attempt;
                let on_lost_peer = op.current_attempt().is_some_and(|a| a.peer == peer);
                if on_lost_peer {
                    effects.push(Effect::CancelTimer {
                        id: timer::remote(&op.id, attempt),
                    });
                    op.absorb(
                        attempt,
                        Err(FenceError::PeerUnavailable(peer)),
                        clock,
                        &mut effects,
                    );
                }
            }

            (OperationState::Intake | OperationState::Querying, OperationEvent::Cancel) => {
                op.finish(Err(FenceError::Cancelled), clock, &mut effects);
            }

            (
                OperationState::Dispatched { attempt } | OperationState::Executing { attempt },
                OperationEvent::Cancel,
            ) => {
                if self.action.is_destructive() {
                    tracing::info!(op_id = %self.id, "destructive operation runs to completion");
                } else {
                    let attempt = *attempt;
                    if let Some(current) = op.current_attempt().cloned() {
                        if current.peer == op.coordinator {
                            effects.push(Effect::CancelAgent {
                                op_id: op.id.clone(),
                                attempt,
                                device: current.device,
                            });
                        } else {
                            effects.push(Effect::SendPeer {
                                peer: current.peer,
                                message: PeerMessage::CancelRequest {
                                    op_id: op.id.clone(),
                                    attempt,
                                },
                            });
                        }
                    }
                    op.state = OperationState::Cancelling { attempt };
                }
            }

            (
                OperationState::Cancelling { attempt: current },
                OperationEvent::AttemptFinished { attempt, .. }
                | OperationEvent::RemoteTimeout { attempt },
            ) if *current == attempt => {
                effects.push(Effect::CancelTimer {
                    id: timer::remote(&op.id, attempt),
                });
                op.finish(Err(FenceError::Cancelled), clock, &mut effects);
            }

            (OperationState::Cancelling { .. }, OperationEvent::DeadlineExpired) => {
                op.finish(Err(FenceError::Cancelled), clock, &mut effects);
            }

            (
                OperationState::Querying
                | OperationState::Dispatched { .. }
                | OperationState::Executing { .. },
                OperationEvent::DeadlineExpired,
            ) => {
                if let Some(current) = op.current_attempt().cloned() {
                    if current.peer == op.coordinator {
                        effects.push(Effect::CancelAgent {
                            op_id: op.id.clone(),
                            attempt: current.seq,
                            device: current.device,
                        });
                    } else {
                        effects.push(Effect::CancelTimer {
                            id: timer::remote(&op.id, current.seq),
                        });
                    }
                }
                let reason = format!(
                    "{} {} exceeded {}",
                    op.action,
                    op.target,
                    humantime::format_duration(op.deadline.saturating_duration_since(op.created_at))
                );
                op.finish(Err(FenceError::Timeout(reason)), clock, &mut effects);
            }

            // Stale replies, duplicate cancels, events after completion
            (state, event) => {
                tracing::debug!(op_id = %self.id, ?state, ?event, "ignored operation event");
            }
        }

        (op, effects)
    }

    /// Hand the attempt at the current position to a device or peer
    fn dispatch(&mut self, clock: &impl Clock, effects: &mut Vec<Effect>) {
        let now = clock.now();
        let Some(planned) = self
            .levels
            .get(self.level_pos)
            .and_then(|l| l.attempts.get(self.device_pos))
            .cloned()
        else {
            self.finish(Err(FenceError::NoDevices), clock, effects);
            return;
        };

        let remaining = self.deadline.saturating_duration_since(now);
        if remaining.is_zero() {
            let reason = format!("no time left for {}", planned.device);
            self.finish(Err(FenceError::Timeout(reason)), clock, effects);
            return;
        }
        let timeout = remaining.min(planned.timeout);
        let seq = self.attempts.len() as u32 + 1;
        self.attempts.push(AttemptRecord {
            seq,
            level: planned.level,
            device: planned.device.clone(),
            peer: planned.peer.clone(),
            deadline: deadline_after(now, timeout),
            result: None,
        });

        if planned.peer == self.coordinator {
            effects.push(Effect::RunAgent {
                op_id: self.id.clone(),
                attempt: seq,
                device: planned.device,
                action: self.action,
                target: self.target.clone(),
                timeout,
            });
            self.state = OperationState::Dispatched { attempt: seq };
        } else {
            effects.push(Effect::SendPeer {
                peer: planned.peer,
                message: PeerMessage::DelegateRequest {
                    op_id: self.id.clone(),
                    attempt: seq,
                    target: self.target.clone(),
                    action: self.action,
                    device: planned.device,
                    deadline: timeout,
                    allow_self_fencing: self.allow_self_fencing,
                },
            });
            effects.push(Effect::SetTimer {
                id: timer::remote(&self.id, seq),
                duration: timeout.saturating_add(REMOTE_GRACE),
            });
            self.state = OperationState::Executing { attempt: seq };
        }
    }

    /// Record an attempt result and advance within or across levels
    fn absorb(
        &mut self,
        seq: u32,
        result: Result<(), FenceError>,
        clock: &impl Clock,
        effects: &mut Vec<Effect>,
    ) {
        let Some(record) = self.attempts.iter_mut().find(|a| a.seq == seq) else {
            return;
        };
        record.result = Some(result.clone());
        let device = record.device.clone();
        let peer = record.peer.clone();
        if peer != self.coordinator {
            effects.push(Effect::CancelTimer {
                id: timer::remote(&self.id, seq),
            });
        }

        match result {
            Ok(()) => {
                self.device_pos += 1;
                let level_len = self
                    .levels
                    .get(self.level_pos)
                    .map(|l| l.attempts.len())
                    .unwrap_or(0);
                if self.device_pos < level_len {
                    self.dispatch(clock, effects);
                } else {
                    self.finish(Ok(peer), clock, effects);
                }
            }
            Err(err) => {
                tracing::info!(op_id = %self.id, device, error = %err, "attempt failed");
                self.failures.push(format!("{device}: {}", err.reason()));
                self.level_pos += 1;
                self.device_pos = 0;
                if self.level_pos < self.levels.len() {
                    self.dispatch(clock, effects);
                } else {
                    let reasons = self.failures.join("; ");
                    self.finish(Err(FenceError::Exhausted(reasons)), clock, effects);
                }
            }
        }
    }

    fn finish(
        &mut self,
        result: Result<String, FenceError>,
        clock: &impl Clock,
        effects: &mut Vec<Effect>,
    ) {
        let (state, delegate, rc, reason) = match &result {
            Ok(delegate) => (HistoryState::Success, Some(delegate.clone()), 0, None),
            Err(FenceError::Cancelled) => (
                HistoryState::Cancelled,
                None,
                FenceError::RC_CANCELLED,
                Some(FenceError::Cancelled.to_string()),
            ),
            Err(e) => (HistoryState::Failure, None, e.rc(), Some(e.reason())),
        };
        let mut record = self.history_record(state, delegate.clone(), reason, Some(clock.utc_now()));
        record.rc = rc;

        self.state = OperationState::Done { result };
        effects.push(Effect::CancelTimer {
            id: timer::deadline(&self.id),
        });
        effects.push(Effect::RecordHistory { record });
        effects.push(self.finished_event(delegate));
    }

    fn finished_event(&self, delegate: Option<String>) -> Effect {
        let (rc, reason) = match self.result() {
            Some(Err(e)) => (e.rc(), Some(e.reason())),
            _ => (0, None),
        };
        Effect::Emit(Event::OperationFinished {
            op_id: self.id.clone(),
            target: self.target.clone(),
            action: self.action,
            rc,
            reason,
            delegate,
        })
    }

    pub fn history_record(
        &self,
        state: HistoryState,
        delegate: Option<String>,
        reason: Option<String>,
        ended: Option<DateTime<Utc>>,
    ) -> HistoryRecord {
        HistoryRecord {
            op_id: self.id.clone(),
            target: self.target.clone(),
            action: self.action,
            origin: self.origin.clone(),
            coordinator: self.coordinator.clone(),
            delegate,
            state,
            rc: 0,
            reason,
            started: self.started,
            ended,
        }
    }
}

/// Timer ids owned by operations
pub mod timer {
    use crate::id::OpId;

    pub fn deadline(op: &OpId) -> String {
        format!("op:{op}:deadline")
    }

    pub fn remote(op: &OpId, attempt: u32) -> String {
        format!("op:{op}:remote:{attempt}")
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum OpTimer {
        Deadline(OpId),
        Remote(OpId, u32),
    }

    pub fn parse(id: &str) -> Option<OpTimer> {
        let rest = id.strip_prefix("op:")?;
        if let Some(op) = rest.strip_suffix(":deadline") {
            return Some(OpTimer::Deadline(OpId::from(op)));
        }
        let (op, attempt) = rest.rsplit_once(":remote:")?;
        Some(OpTimer::Remote(OpId::from(op), attempt.parse().ok()?))
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
