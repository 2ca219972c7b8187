// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fenced-core: types and pure state machines of the fencing daemon
//!
//! Nothing here performs I/O. Registries and directories are plain data,
//! operations are driven by events and answer with effects.

pub mod action;
pub mod clock;
pub mod device;
pub mod effect;
pub mod error;
pub mod event;
pub mod history;
pub mod id;
pub mod message;
pub mod operation;
pub mod peer;
pub mod plan;
pub mod registry;
pub mod topology;
pub mod traced;

pub use action::{Action, UnknownAction};
pub use clock::{Clock, FakeClock, SystemClock};
pub use device::{
    Device, DeviceAdvert, DeviceSource, DeviceSpec, DeviceStatus, HostCheck, MatchRank,
    MAX_TIMEOUT, WATCHDOG_DEVICE,
};
pub use effect::Effect;
pub use error::{rc_of, FenceError, RegisterError};
pub use event::Event;
pub use history::{HistoryRecord, HistoryState};
pub use id::{IdGen, OpId, SequentialIdGen, UuidIdGen};
pub use message::{PeerEnvelope, PeerMessage};
pub use operation::{
    Attempt, Operation, OperationEvent, OperationRequest, OperationState, PlannedLevel,
};
pub use peer::{Candidate, PeerDirectory, PeerState};
pub use plan::PlanInputs;
pub use registry::{DeviceRegistry, ProbeTicket, RegisterOutcome, RegistryConfig};
pub use topology::{HostInfo, TargetSpec, TopologyLevel, TopologyTable};
pub use traced::TracedEffect;
