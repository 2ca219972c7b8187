// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects requested by the operation state machine

use crate::action::Action;
use crate::event::Event;
use crate::history::HistoryRecord;
use crate::id::OpId;
use crate::message::PeerMessage;
use crate::traced::TracedEffect;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Queue an agent invocation on a local device
    RunAgent {
        op_id: OpId,
        attempt: u32,
        device: String,
        action: Action,
        target: String,
        timeout: Duration,
    },
    /// Cancel a queued or running invocation
    CancelAgent {
        op_id: OpId,
        attempt: u32,
        device: String,
    },
    SendPeer {
        peer: String,
        message: PeerMessage,
    },
    Broadcast {
        message: PeerMessage,
    },
    /// Append to history and tell the peers
    RecordHistory {
        record: HistoryRecord,
    },
    SetTimer {
        id: String,
        duration: Duration,
    },
    CancelTimer {
        id: String,
    },
    Emit(Event),
}

impl TracedEffect for Effect {
    fn name(&self) -> &'static str {
        match self {
            Effect::RunAgent { .. } => "run_agent",
            Effect::CancelAgent { .. } => "cancel_agent",
            Effect::SendPeer { .. } => "send_peer",
            Effect::Broadcast { .. } => "broadcast",
            Effect::RecordHistory { .. } => "record_history",
            Effect::SetTimer { .. } => "set_timer",
            Effect::CancelTimer { .. } => "cancel_timer",
            Effect::Emit(_) => "emit",
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Effect::RunAgent {
                op_id,
                attempt,
                device,
                action,
                target,
                timeout,
            } => vec![
                ("op_id", op_id.to_string()),
                ("attempt", attempt.to_string()),
                ("device", device.clone()),
                ("action", action.to_string()),
                ("target", target.clone()),
                ("timeout_ms", timeout.as_millis().to_string()),
            ],
            Effect::CancelAgent {
                op_id,
                attempt,
                device,
            } => vec![
                ("op_id", op_id.to_string()),
                ("attempt", attempt.to_string()),
                ("device", device.clone()),
            ],
            Effect::SendPeer { peer, message } => {
                vec![("peer", peer.clone()), ("message", message.kind().to_string())]
            }
            Effect::Broadcast { message } => vec![("message", message.kind().to_string())],
            Effect::RecordHistory { record } => vec![
                ("op_id", record.op_id.to_string()),
                ("state", format!("{:?}", record.state)),
            ],
            Effect::SetTimer { id, duration } => vec![
                ("id", id.clone()),
                ("duration_ms", duration.as_millis().to_string()),
            ],
            Effect::CancelTimer { id } => vec![("id", id.clone())],
            Effect::Emit(event) => vec![("event", event.name().to_string())],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_agent_fields_name_the_device() {
        let effect = Effect::RunAgent {
            op_id: OpId::from("op-1"),
            attempt: 1,
            device: "D1".into(),
            action: Action::Off,
            target: "nodeA".into(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(effect.name(), "run_agent");
        assert!(effect
            .fields()
            .contains(&("timeout_ms", "30000".to_string())));
    }
}
