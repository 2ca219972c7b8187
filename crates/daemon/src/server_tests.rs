// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fenced_adapters::{FakeAgentAdapter, FakeNotifyAdapter, FakePeerAdapter};
use fenced_core::{Action, FakeClock, SequentialIdGen};
use fenced_engine::{RuntimeConfig, RuntimeDeps};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

type TestContext =
    ServerContext<FakeAgentAdapter, FakePeerAdapter, FakeNotifyAdapter, FakeClock, SequentialIdGen>;

const DAEMON_UID: u32 = 500;
const ROOT: Option<u32> = Some(0);
const STRANGER: Option<u32> = Some(1000);

fn context() -> (TestContext, FakeAgentAdapter) {
    let agents = FakeAgentAdapter::new();
    let (tx, mut rx) = mpsc::channel(64);
    let core = Arc::new(FencerCore::new(
        RuntimeDeps {
            agents: agents.clone(),
            peers: FakePeerAdapter::new(&[]),
            notify: FakeNotifyAdapter::new(),
            events: tx,
        },
        RuntimeConfig::new("node1"),
        FakeClock::new(),
        SequentialIdGen::new("op"),
    ));
    // Stand-in for the daemon's event loop
    let pump = Arc::clone(&core);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            pump.handle(event).await;
        }
    });

    let config = DaemonConfig::parse(
        "node_name = \"node1\"\nstate_dir = \"/tmp/fenced-server-test\"\nprivileged_uids = [189]\n",
    )
    .unwrap();
    (
        ServerContext::new(core, &config, DAEMON_UID, Arc::new(Notify::new())),
        agents,
    )
}

fn register(device: &str, hosts: &str) -> Request {
    let mut params = BTreeMap::new();
    params.insert("pcmk_host_list".to_string(), hosts.to_string());
    Request::RegisterDevice {
        device: device.to_string(),
        agent: "fence_dummy".to_string(),
        params,
        unfencing: false,
    }
}

fn fence(target: &str, action: Action, detach: bool) -> Request {
    Request::Fence {
        target: target.to_string(),
        action,
        timeout_s: Some(30),
        tolerance_s: None,
        allow_self_fencing: false,
        detach,
        client_id: Some("test".to_string()),
    }
}

#[tokio::test]
async fn ping_and_hello() {
    let (ctx, _) = context();

    assert_eq!(handle_request(&ctx, Request::Ping, None).await, Response::Pong);
    assert_eq!(
        handle_request(
            &ctx,
            Request::Hello {
                version: "0".to_string()
            },
            None
        )
        .await,
        Response::Hello {
            version: PROTOCOL_VERSION.to_string()
        }
    );
}

#[tokio::test]
async fn registration_needs_privilege() {
    let (ctx, _) = context();

    let response = handle_request(&ctx, register("D1", "nodeA"), STRANGER).await;

    assert!(matches!(response, Response::Error { rc, .. } if rc == FenceError::RC_DENIED));
    assert!(ctx.core.list_registered().is_empty());
}

#[tokio::test]
async fn listed_and_daemon_uids_are_privileged() {
    let (ctx, _) = context();

    let by_listed = handle_request(&ctx, register("D1", "nodeA"), Some(189)).await;
    let by_daemon_user = handle_request(&ctx, register("D2", "nodeB"), Some(DAEMON_UID)).await;

    assert!(matches!(by_listed, Response::Registered { replaced: false, .. }));
    assert!(matches!(by_daemon_user, Response::Registered { .. }));
    assert_eq!(
        handle_request(&ctx, Request::ListRegistered, STRANGER).await,
        Response::Devices {
            devices: vec!["D1".to_string(), "D2".to_string()]
        }
    );
}

#[tokio::test]
async fn reregistration_reports_replacement() {
    let (ctx, _) = context();
    handle_request(&ctx, register("D1", "nodeA"), ROOT).await;

    let response = handle_request(&ctx, register("D1", "nodeB"), ROOT).await;

    assert!(matches!(response, Response::Registered { replaced: true, .. }));
}

#[tokio::test]
async fn unknown_agent_is_rejected_with_its_rc() {
    let (ctx, _) = context();
    let request = Request::RegisterDevice {
        device: "D1".to_string(),
        agent: "fence_missing".to_string(),
        params: BTreeMap::new(),
        unfencing: false,
    };

    let response = handle_request(&ctx, request, ROOT).await;

    assert!(matches!(response, Response::Error { rc: -2, .. }));
}

#[tokio::test]
async fn blocking_fence_waits_for_the_outcome() {
    let (ctx, agents) = context();
    handle_request(&ctx, register("D1", "nodeA"), ROOT).await;

    let response = handle_request(&ctx, fence("nodeA", Action::Off, false), STRANGER).await;

    match response {
        Response::Fenced {
            rc,
            delegate,
            merged,
            ..
        } => {
            assert_eq!(rc, 0);
            assert_eq!(delegate.as_deref(), Some("node1"));
            assert!(!merged);
        }
        other => panic!("expected outcome, got {other:?}"),
    }
    assert_eq!(agents.calls_for("D1", Action::Off).len(), 1);
}

#[tokio::test]
async fn detached_fence_answers_with_the_op_id() {
    let (ctx, _) = context();
    handle_request(&ctx, register("D1", "nodeA"), ROOT).await;

    let response = handle_request(&ctx, fence("nodeA", Action::Off, true), STRANGER).await;

    assert!(matches!(response, Response::Accepted { merged: false, .. }));
}

#[tokio::test]
async fn fence_without_devices_reports_no_devices() {
    let (ctx, _) = context();

    let response = handle_request(&ctx, fence("nodeZ", Action::Off, false), STRANGER).await;

    assert!(matches!(
        response,
        Response::Fenced { rc, .. } | Response::Error { rc, .. } if rc == FenceError::RC_NO_DEVICES
    ));
}

#[tokio::test]
async fn confirm_needs_privilege() {
    let (ctx, _) = context();

    let response = handle_request(&ctx, fence("nodeA", Action::Confirm, false), STRANGER).await;

    assert!(matches!(response, Response::Error { rc, .. } if rc == FenceError::RC_DENIED));
}

#[tokio::test]
async fn query_lists_candidates_with_their_rank() {
    let (ctx, _) = context();
    handle_request(&ctx, register("D1", "nodeA"), ROOT).await;

    let response = handle_request(
        &ctx,
        Request::Query {
            target: "nodeA".to_string(),
            action: Action::Off,
        },
        None,
    )
    .await;

    match response {
        Response::Candidates { candidates } => {
            assert_eq!(candidates.len(), 1);
            assert_eq!(candidates[0].device, "D1");
            assert_eq!(candidates[0].peer, "node1");
            assert_eq!(candidates[0].rank, "host-list");
        }
        other => panic!("expected candidates, got {other:?}"),
    }
}

#[tokio::test]
async fn status_of_an_unknown_device() {
    let (ctx, _) = context();

    let response = handle_request(
        &ctx,
        Request::DeviceStatus {
            device: "nope".to_string(),
            timeout_s: None,
        },
        None,
    )
    .await;

    assert!(matches!(response, Response::Error { rc, .. } if rc == FenceError::RC_UNKNOWN));
}

#[tokio::test]
async fn history_follows_a_fence() {
    let (ctx, _) = context();
    handle_request(&ctx, register("D1", "nodeA"), ROOT).await;
    handle_request(&ctx, fence("nodeA", Action::Off, false), ROOT).await;

    let response = handle_request(
        &ctx,
        Request::History {
            target: Some("nodeA".to_string()),
        },
        None,
    )
    .await;

    match response {
        Response::History { records } => {
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].target, "nodeA");
        }
        other => panic!("expected history, got {other:?}"),
    }
}

#[tokio::test]
async fn shutdown_needs_privilege_and_signals_the_loop() {
    let (ctx, _) = context();

    let refused = handle_request(&ctx, Request::Shutdown, STRANGER).await;
    assert!(matches!(refused, Response::Error { .. }));

    let accepted = handle_request(&ctx, Request::Shutdown, ROOT).await;
    assert_eq!(accepted, Response::ShuttingDown);
    // The permit is stored until the loop waits for it
    tokio::time::timeout(Duration::from_secs(1), ctx.shutdown.notified())
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_cancel_is_reported() {
    let (ctx, _) = context();

    let response = handle_request(
        &ctx,
        Request::Cancel {
            op_id: fenced_core::OpId::from("op-404"),
        },
        ROOT,
    )
    .await;

    assert!(matches!(response, Response::Error { rc, .. } if rc == FenceError::RC_UNKNOWN));
}
