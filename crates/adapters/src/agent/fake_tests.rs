// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn invocation(device: &str, action: Action, timeout: Duration) -> AgentInvocation {
    AgentInvocation {
        device: device.into(),
        agent: "fence_dummy".into(),
        action,
        args: vec![("action".into(), action.as_str().into())],
        timeout,
    }
}

#[tokio::test]
async fn fake_agent_records_calls_and_succeeds_by_default() {
    let agent = FakeAgentAdapter::new();
    let (_tx, rx) = watch::channel(false);

    agent
        .execute(invocation("D1", Action::Off, Duration::from_secs(1)), rx)
        .await
        .unwrap();

    let calls = agent.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].device, "D1");
    assert_eq!(agent.max_in_flight("D1"), 1);
}

#[tokio::test]
async fn scripted_outcomes_are_consumed_in_order() {
    let agent = FakeAgentAdapter::new();
    agent.script(
        "D1",
        Action::Off,
        vec![FakeOutcome::exit(1, "bad"), FakeOutcome::ok()],
    );
    let (_tx, rx) = watch::channel(false);

    let inv = invocation("D1", Action::Off, Duration::from_secs(1));
    assert!(agent.execute(inv.clone(), rx.clone()).await.is_err());
    assert!(agent.execute(inv.clone(), rx.clone()).await.is_ok());
    assert!(agent.execute(inv, rx).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn delay_beyond_timeout_times_out() {
    let agent = FakeAgentAdapter::new();
    agent.script(
        "D1",
        Action::Off,
        vec![FakeOutcome::ok().after(Duration::from_secs(10))],
    );
    let (_tx, rx) = watch::channel(false);

    let err = agent
        .execute(invocation("D1", Action::Off, Duration::from_secs(2)), rx)
        .await
        .unwrap_err();
    assert_eq!(err, AgentError::Timeout(Duration::from_secs(2)));
}

#[tokio::test]
async fn uninstalled_agent_fails() {
    let agent = FakeAgentAdapter::new();
    let (_tx, rx) = watch::channel(false);
    let mut inv = invocation("D1", Action::Off, Duration::from_secs(1));
    inv.agent = "fence_missing".into();

    assert_eq!(
        agent.execute(inv, rx).await.unwrap_err(),
        AgentError::NotInstalled("fence_missing".into())
    );
}
