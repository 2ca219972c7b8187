// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fenced-daemon library: the IPC protocol and daemon configuration,
//! shared with `fence-admin`

pub mod config;
pub mod protocol;

pub use config::{ConfigError, DaemonConfig};
pub use protocol::{ProtocolError, Request, Response, PROTOCOL_VERSION};
