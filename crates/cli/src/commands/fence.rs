// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fencing commands: off, reboot, on, confirm and cancel

use std::fmt;

use anyhow::Result;
use fenced_core::{Action, OpId};
use serde::Serialize;

use super::Options;
use crate::client::{DaemonClient, FenceParams, FenceReply};
use crate::output;

/// What a fence command reports back
#[derive(Debug, Serialize)]
pub struct FenceSummary {
    pub op_id: OpId,
    pub target: String,
    pub action: Action,
    pub state: &'static str,
    pub delegate: Option<String>,
    pub merged: bool,
}

impl FenceSummary {
    fn from_reply(target: String, action: Action, reply: FenceReply) -> Self {
        match reply {
            FenceReply::Done {
                op_id,
                delegate,
                merged,
            } => FenceSummary {
                op_id,
                target,
                action,
                state: "done",
                delegate,
                merged,
            },
            FenceReply::Accepted { op_id, merged } => FenceSummary {
                op_id,
                target,
                action,
                state: "accepted",
                delegate: None,
                merged,
            },
        }
    }
}

impl fmt::Display for FenceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.state, self.action) {
            ("accepted", _) => write!(
                f,
                "{} of {} accepted as {}",
                self.action, self.target, self.op_id
            )?,
            (_, Action::Confirm) => write!(f, "{} confirmed down", self.target)?,
            _ => write!(
                f,
                "{} of {} succeeded (by {})",
                self.action,
                self.target,
                self.delegate.as_deref().unwrap_or("unknown")
            )?,
        }
        if self.merged {
            write!(f, ", merged with a pending request")?;
        }
        Ok(())
    }
}

pub async fn fence(
    client: &DaemonClient,
    target: String,
    action: Action,
    options: &Options,
) -> Result<()> {
    let params = FenceParams {
        target: target.clone(),
        action,
        timeout: options.timeout,
        tolerance: options.tolerance,
        allow_self_fencing: options.allow_self_fencing,
        detach: options.detach,
        client_id: options.client_id.clone(),
    };
    tracing::debug!(host = %target, %action, detach = options.detach, "requesting fence");
    let reply = client.fence(params).await?;
    if !options.quiet {
        output::print(&FenceSummary::from_reply(target, action, reply), options.format);
    }
    Ok(())
}

pub async fn cancel(client: &DaemonClient, op_id: &str, options: &Options) -> Result<()> {
    client.cancel(op_id).await?;
    options.say(format!("Cancelled {op_id}"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_names_the_delegate() {
        let summary = FenceSummary::from_reply(
            "node3".to_string(),
            Action::Reboot,
            FenceReply::Done {
                op_id: OpId::from("op-1"),
                delegate: Some("node2".to_string()),
                merged: false,
            },
        );
        assert_eq!(summary.to_string(), "reboot of node3 succeeded (by node2)");
    }

    #[test]
    fn accepted_shows_the_operation_id() {
        let summary = FenceSummary::from_reply(
            "node3".to_string(),
            Action::Off,
            FenceReply::Accepted {
                op_id: OpId::from("op-7"),
                merged: true,
            },
        );
        assert_eq!(
            summary.to_string(),
            "off of node3 accepted as op-7, merged with a pending request"
        );
    }

    #[test]
    fn confirm_reads_as_confirmation() {
        let summary = FenceSummary::from_reply(
            "node4".to_string(),
            Action::Confirm,
            FenceReply::Done {
                op_id: OpId::from("op-2"),
                delegate: Some("node1".to_string()),
                merged: false,
            },
        );
        assert_eq!(summary.to_string(), "node4 confirmed down");
    }
}
