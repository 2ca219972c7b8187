// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! History records of fencing operations

use crate::action::Action;
use crate::id::OpId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryState {
    /// Placeholder written when the first attempt is dispatched
    Pending,
    Success,
    Failure,
    Cancelled,
}

impl HistoryState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HistoryState::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub op_id: OpId,
    pub target: String,
    pub action: Action,
    /// Client (or daemon) that asked for the operation
    pub origin: String,
    /// Peer that coordinated the operation
    pub coordinator: String,
    /// Peer that performed the action; set on success
    #[serde(default)]
    pub delegate: Option<String>,
    pub state: HistoryState,
    #[serde(default)]
    pub rc: i32,
    #[serde(default)]
    pub reason: Option<String>,
    pub started: DateTime<Utc>,
    #[serde(default)]
    pub ended: Option<DateTime<Utc>>,
}

impl HistoryRecord {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Completion time, or start time for placeholders
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.ended.unwrap_or(self.started)
    }

    /// Total order within a target
    pub fn sort_key(&self) -> (DateTime<Utc>, &OpId) {
        (self.timestamp(), &self.op_id)
    }
}
