// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
// Enable coverage(off) attribute for excluding test infrastructure
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Adapters for external I/O: fencing agents, peer transport, notifications

pub mod agent;
pub mod notify;
pub mod peer;
pub mod traced;

pub use agent::{
    parse_list_output, AgentAdapter, AgentError, AgentInvocation, AgentOutput,
    ProcessAgentAdapter,
};
pub use notify::{
    CommandNotifyAdapter, LogNotifyAdapter, NotifyAdapter, NotifyError,
};
pub use peer::{PeerAdapter, PeerError, TcpPeerAdapter};
pub use traced::{TracedAgentAdapter, TracedPeerAdapter};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use agent::{AgentCall, FakeAgentAdapter, FakeOutcome};
#[cfg(any(test, feature = "test-support"))]
pub use notify::{FakeNotifyAdapter, NotifyCall};
#[cfg(any(test, feature = "test-support"))]
pub use peer::{FakePeerAdapter, PeerCall};
