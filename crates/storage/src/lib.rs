// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fenced-storage: fencing history kept by each peer
//!
//! History lives in memory only. A restarted peer rebuilds it from the
//! other peers through history sync.

mod history;

pub use history::{AppendOutcome, HistoryStore, DEFAULT_CAP};
