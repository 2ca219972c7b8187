// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inputs of the runtime's event loop
//!
//! Everything that happens asynchronously (agent runs, peer traffic, transport
//! failures) comes back to the runtime as a [`RuntimeEvent`].

use fenced_adapters::{AgentError, AgentInvocation, AgentOutput};
use fenced_core::{Action, OpId, PeerMessage};

/// Why an agent job was queued; decides where its result goes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Attempt of an operation this peer coordinates
    Attempt { op_id: OpId, attempt: u32 },
    /// Attempt delegated to us by another peer
    Delegated {
        coordinator: String,
        op_id: OpId,
        attempt: u32,
    },
    /// Capability probe (`list`)
    Probe { generation: u64 },
    /// Device check requested by a client
    Verify { request: u64 },
}

impl JobKind {
    pub fn label(&self) -> &'static str {
        match self {
            JobKind::Attempt { .. } => "attempt",
            JobKind::Delegated { .. } => "delegated",
            JobKind::Probe { .. } => "probe",
            JobKind::Verify { .. } => "verify",
        }
    }
}

/// One queued agent run, with the device snapshot already applied
#[derive(Debug, Clone)]
pub struct AgentJob {
    pub kind: JobKind,
    pub invocation: AgentInvocation,
    /// Extra tries after a retryable failure
    pub retries: u32,
}

impl AgentJob {
    pub fn device(&self) -> &str {
        &self.invocation.device
    }

    pub fn action(&self) -> Action {
        self.invocation.action
    }
}

#[derive(Debug)]
pub enum RuntimeEvent {
    AgentStarted {
        kind: JobKind,
        device: String,
    },
    AgentFinished {
        kind: JobKind,
        device: String,
        action: Action,
        result: Result<AgentOutput, AgentError>,
    },
    Peer {
        from: String,
        message: PeerMessage,
    },
    /// The transport could not deliver to a peer
    PeerFailed {
        peer: String,
    },
}

impl RuntimeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeEvent::AgentStarted { .. } => "agent:started",
            RuntimeEvent::AgentFinished { .. } => "agent:finished",
            RuntimeEvent::Peer { .. } => "peer:message",
            RuntimeEvent::PeerFailed { .. } => "peer:failed",
        }
    }
}
