// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Messages exchanged between fencer peers

use crate::action::Action;
use crate::device::DeviceAdvert;
use crate::history::HistoryRecord;
use crate::id::OpId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerMessage {
    /// Registered devices of the sender. `adverts` is present on the full
    /// snapshot sent after a change and absent on heartbeats.
    DeviceGossip {
        peer: String,
        device_ids: Vec<String>,
        epoch: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        adverts: Option<Vec<DeviceAdvert>>,
    },
    DelegateRequest {
        op_id: OpId,
        #[serde(default)]
        attempt: u32,
        target: String,
        action: Action,
        device: String,
        /// Time left for this attempt
        #[serde(with = "humantime_serde")]
        deadline: Duration,
        #[serde(default)]
        allow_self_fencing: bool,
    },
    DelegateReply {
        op_id: OpId,
        #[serde(default)]
        attempt: u32,
        rc: i32,
        reason: String,
        started: DateTime<Utc>,
        ended: DateTime<Utc>,
    },
    CancelRequest {
        op_id: OpId,
        #[serde(default)]
        attempt: u32,
    },
    HistoryAppend {
        record: HistoryRecord,
    },
    HistorySyncReq {
        peer: String,
        since: Option<DateTime<Utc>>,
    },
    HistorySyncResp {
        records: Vec<HistoryRecord>,
    },
}

impl PeerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::DeviceGossip { .. } => "device_gossip",
            PeerMessage::DelegateRequest { .. } => "delegate_request",
            PeerMessage::DelegateReply { .. } => "delegate_reply",
            PeerMessage::CancelRequest { .. } => "cancel_request",
            PeerMessage::HistoryAppend { .. } => "history_append",
            PeerMessage::HistorySyncReq { .. } => "history_sync_req",
            PeerMessage::HistorySyncResp { .. } => "history_sync_resp",
        }
    }
}

/// A message with its sender, as carried on the peer transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEnvelope {
    pub from: String,
    pub message: PeerMessage,
}
