// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification events
//!
//! Emitted by state machines and the runtime, delivered to the notify
//! adapter.

use crate::action::Action;
use crate::id::OpId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    OperationStarted {
        op_id: OpId,
        target: String,
        action: Action,
    },
    OperationFinished {
        op_id: OpId,
        target: String,
        action: Action,
        rc: i32,
        reason: Option<String>,
        delegate: Option<String>,
    },
    DeviceRegistered {
        device: String,
    },
    DeviceRemoved {
        device: String,
    },
    LevelRegistered {
        target: String,
        index: u8,
    },
    LevelRemoved {
        target: String,
        index: u8,
    },
    PeerJoined {
        peer: String,
    },
    PeerLost {
        peer: String,
    },
}

impl Event {
    /// Event name for notification channels
    /// Format: "category:action"
    pub fn name(&self) -> &'static str {
        match self {
            Event::OperationStarted { .. } => "operation:started",
            Event::OperationFinished { .. } => "operation:finished",
            Event::DeviceRegistered { .. } => "device:registered",
            Event::DeviceRemoved { .. } => "device:removed",
            Event::LevelRegistered { .. } => "level:registered",
            Event::LevelRemoved { .. } => "level:removed",
            Event::PeerJoined { .. } => "peer:joined",
            Event::PeerLost { .. } => "peer:lost",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_use_category_prefix() {
        let event = Event::OperationFinished {
            op_id: OpId::from("op-1"),
            target: "nodeA".into(),
            action: Action::Off,
            rc: 0,
            reason: None,
            delegate: Some("node1".into()),
        };
        assert_eq!(event.name(), "operation:finished");
        assert_eq!(
            Event::PeerLost { peer: "node2".into() }.name(),
            "peer:lost"
        );
    }

    #[test]
    fn serializes_with_event_tag() {
        let json = serde_json::to_value(Event::DeviceRemoved { device: "D1".into() }).unwrap();
        assert_eq!(json["event"], "device_removed");
    }
}
