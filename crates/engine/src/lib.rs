// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fenced-engine: the fencer runtime
//!
//! Drives operations through their state machines, runs agents through
//! per-device queues and keeps peers in sync.

mod error;
mod events;
mod executor;
mod queue;
mod runtime;
mod scheduler;

pub use error::RuntimeError;
pub use events::{AgentJob, JobKind, RuntimeEvent};
pub use executor::{ExecuteError, Executor, ExecutorDeps};
pub use queue::{CancelOutcome, DeviceQueues, QUEUE_LIMIT};
pub use runtime::{
    ConfigDelta, CoreStatus, FenceHandle, FenceOutcome, FenceRequest, FencerCore, RuntimeConfig,
    RuntimeDeps, MISSED_GOSSIP_LIMIT, TICK_TIMER, UNFENCE_ORIGIN,
};
pub use scheduler::Scheduler;
