// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    no_devices = { FenceError::NoDevices },
    unknown = { FenceError::Unknown("D9".into()) },
    busy = { FenceError::Busy("D1".into()) },
    timeout = { FenceError::Timeout("D1 after 30s".into()) },
    spawn = { FenceError::Spawn("fence_x: not found".into()) },
    peer = { FenceError::PeerUnavailable("node2".into()) },
    denied = { FenceError::Denied("confirm".into()) },
    bad_request = { FenceError::BadRequest("index".into()) },
    exhausted = { FenceError::Exhausted("D1: exit 1".into()) },
    cancelled = { FenceError::Cancelled },
    not_supported = { FenceError::NotSupported("on".into()) },
)]
fn rc_survives_the_wire(err: FenceError) {
    let rebuilt = FenceError::from_rc(err.rc(), err.reason()).unwrap();
    assert_eq!(rebuilt.kind(), err.kind());
    assert!(err.rc() < 0);
}

#[test]
fn zero_rc_is_success() {
    assert_eq!(FenceError::from_rc(0, "ok"), None);
}

#[test]
fn unmapped_rc_is_agent_failure() {
    let err = FenceError::from_rc(-1, "exit 1").unwrap();
    assert_eq!(err, FenceError::AgentFailure("exit 1".into()));
}

#[test]
fn register_errors_map_to_client_kinds() {
    let bad: FenceError = RegisterError::BadParameters("pcmk_host_map".into()).into();
    assert_eq!(bad.rc(), FenceError::RC_BAD_REQUEST);
    let agent: FenceError = RegisterError::UnknownAgent("fence_nope".into()).into();
    assert_eq!(agent.kind(), "Unknown");
}

#[test]
fn register_error_codes() {
    assert_eq!(RegisterError::UnknownAgent("fence_nope".into()).rc(), -2);
    assert_eq!(RegisterError::BadParameters("x".into()).rc(), -22);
    assert_eq!(RegisterError::Disabled("watchdog".into()).rc(), -95);
}

#[test]
fn serializes_with_kind_tag() {
    let json = serde_json::to_value(FenceError::Busy("D1".into())).unwrap();
    assert_eq!(json["kind"], "busy");
    assert_eq!(json["reason"], "D1");
}
