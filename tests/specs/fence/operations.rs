//! Fencing operation specs
//!
//! A single node with a local dummy agent fences a peer that is not running.

use crate::prelude::*;

fn running_with(agent_script: &str) -> Project {
    let mut project = Project::empty();
    project.agent("fence_dummy", agent_script);
    project.start_daemon();
    project
        .admin()
        .args(&[
            "--register", "d1", "--agent", "fence_dummy", "-o", "pcmk_host_list=node2",
        ])
        .passes();
    project
}

#[test]
fn fence_runs_the_agent_and_reports_the_delegate() {
    let project = running_with(DUMMY_AGENT);

    project
        .admin()
        .args(&["--fence", "node2", "--timeout", "20"])
        .passes()
        .stdout_has("off of node2 succeeded (by node1)");

    let log = project.agent_log("fence_dummy");
    assert!(log.contains(&"off node2".to_string()), "agent log: {log:?}");
}

#[test]
fn history_records_the_success() {
    let project = running_with(DUMMY_AGENT);
    project
        .admin()
        .args(&["--fence", "node2", "--timeout", "20", "--client-id", "spec"])
        .passes();

    project
        .admin()
        .args(&["--history", "node2"])
        .passes()
        .stdout_has("off of node2 by node1 for spec@node1: OK");

    project
        .admin()
        .args(&["--history", "*", "--output", "json"])
        .passes()
        .stdout_has("\"state\": \"success\"");
}

#[test]
fn fencing_a_host_nobody_can_reach_fails() {
    let project = running_with(DUMMY_AGENT);

    project
        .admin()
        .args(&["--fence", "node9", "--timeout", "5"])
        .fails()
        .stderr_has("error:");
}

#[test]
fn agent_failure_is_reported_with_its_code() {
    let project = running_with(FAILING_AGENT);

    let run = project
        .admin()
        .args(&["--fence", "node2", "--timeout", "10"])
        .fails();
    assert!(run.stderr().contains("error:"), "stderr: {}", run.stderr());
}

#[test]
fn confirm_records_the_host_as_down() {
    let project = running_with(DUMMY_AGENT);

    project
        .admin()
        .args(&["--confirm", "node2"])
        .passes()
        .stdout_has("node2 confirmed down");

    assert!(project.agent_log("fence_dummy").is_empty());
}

#[test]
fn async_fence_returns_an_operation_id() {
    let project = running_with(DUMMY_AGENT);

    project
        .admin()
        .args(&["--fence", "node2", "--timeout", "20", "--async"])
        .passes()
        .stdout_has("accepted as");
}

#[test]
fn cancelling_an_unknown_operation_fails() {
    let project = running_with(DUMMY_AGENT);

    project
        .admin()
        .args(&["--cancel", "op-does-not-exist"])
        .exits_with(6);
}
