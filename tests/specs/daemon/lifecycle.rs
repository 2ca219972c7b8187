//! Daemon lifecycle specs
//!
//! Verify startup, status and shutdown as seen through fence-admin.

use std::time::{Duration, Instant};

use assert_cmd::prelude::*;

use crate::prelude::*;

#[test]
fn status_shows_the_node_after_start() {
    let mut project = Project::empty();
    project.start_daemon();

    project
        .admin()
        .args(&["--status"])
        .passes()
        .stdout_has("on node1")
        .stdout_has("devices:    0");
}

#[test]
fn status_as_json() {
    let mut project = Project::empty();
    project.start_daemon();

    let run = project
        .admin()
        .args(&["--status", "--output", "json"])
        .passes();
    let json = run.stdout_json();
    assert_eq!(json["node"], "node1");
}

#[test]
fn startup_writes_pid_and_log_marker() {
    let mut project = Project::empty();
    project.start_daemon();

    let pid = std::fs::read_to_string(project.state_path().join("fenced.pid")).unwrap();
    assert!(pid.trim().parse::<u32>().is_ok(), "pid file: {pid:?}");
    assert!(project.daemon_log().contains("fenced: starting"));
}

#[test]
fn shutdown_removes_the_socket() {
    let mut project = Project::empty();
    project.start_daemon();

    project
        .admin()
        .args(&["--shutdown"])
        .passes()
        .stdout_has("fenced stopping");

    let deadline = Instant::now() + Duration::from_secs(10);
    while project.socket().exists() {
        assert!(Instant::now() < deadline, "socket still present");
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn second_daemon_leaves_the_first_running() {
    let mut project = Project::empty();
    project.start_daemon();

    let mut second = std::process::Command::cargo_bin("fenced").unwrap();
    second
        .arg(project.path().join("fenced.toml"))
        .env_remove("FENCED_SOCKET_PATH")
        .env_remove("FENCED_CONFIG")
        .assert()
        .failure();

    assert!(project.socket().exists());
    project.admin().args(&["--status"]).passes();
}
