// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use fenced_core::{Action, OpId};

fn record(state: HistoryState) -> HistoryRecord {
    HistoryRecord {
        op_id: OpId::from("op-1"),
        target: "node3".to_string(),
        action: Action::Reboot,
        origin: "admin".to_string(),
        coordinator: "node1".to_string(),
        delegate: Some("node2".to_string()),
        state,
        rc: 0,
        reason: None,
        started: chrono::Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ended: Some(chrono::Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 7).unwrap()),
    }
}

#[test]
fn success_names_the_delegate() {
    let line = HistoryRow(record(HistoryState::Success)).to_string();
    assert_eq!(
        line,
        "reboot of node3 by node2 for admin@node1: OK (2026-03-01 12:00:07)"
    );
}

#[test]
fn failure_shows_rc_and_reason() {
    let mut r = record(HistoryState::Failure);
    r.rc = -71;
    r.reason = Some("all levels failed".to_string());

    let line = HistoryRow(r).to_string();

    assert!(line.contains("failed rc=-71 all levels failed"));
}

#[test]
fn history_row_serializes_as_the_record() {
    let json = serde_json::to_value(HistoryRow(record(HistoryState::Success))).unwrap();
    assert_eq!(json["target"], "node3");
    assert_eq!(json["state"], "success");
}

#[test]
fn candidate_row_lists_device_first() {
    let row = CandidateRow(CandidateSummary {
        peer: "node2".to_string(),
        device: "ipmi-3".to_string(),
        rank: "host-map".to_string(),
        timeout_s: 60,
    });
    let line = row.to_string();
    assert!(line.starts_with("ipmi-3"));
    assert!(line.ends_with("60s"));
}

#[test]
fn status_without_peers() {
    let view = StatusView(DaemonStatus {
        node: "node1".to_string(),
        version: "0.1.0".to_string(),
        uptime_secs: 42,
        devices: 2,
        levels: 1,
        operations: 0,
        active_peers: Vec::new(),
        busy_devices: 0,
    });
    let text = view.to_string();
    assert!(text.starts_with("fenced 0.1.0 on node1"));
    assert!(text.contains("peers:      none"));
}
