//! Argument and connection error specs

use crate::prelude::*;

#[test]
fn a_command_is_required() {
    admin().fails().stderr_has("required");
}

#[test]
fn two_commands_conflict() {
    admin()
        .args(&["--fence", "node2", "--reboot", "node2"])
        .fails()
        .stderr_has("cannot be used with");
}

#[test]
fn register_needs_an_agent() {
    admin()
        .args(&["--register", "ipmi-1"])
        .fails()
        .stderr_has("--agent");
}

#[test]
fn level_index_is_bounded() {
    admin()
        .args(&["--register-level", "node2", "--index", "12", "--device", "d1"])
        .fails()
        .stderr_has("12");
}

#[test]
fn options_must_be_key_value() {
    admin()
        .args(&["--register", "d1", "--agent", "fence_dummy", "-o", "novalue"])
        .fails()
        .stderr_has("KEY=VALUE");
}

#[test]
fn missing_daemon_exits_with_one() {
    let project = Project::empty();

    project
        .admin()
        .args(&["--list-registered"])
        .exits_with(1)
        .stderr_has("fenced is not running");
}

#[test]
fn quiet_suppresses_the_error_text() {
    let project = Project::empty();

    let run = project
        .admin()
        .args(&["--quiet", "--status"])
        .exits_with(1);
    assert!(run.stderr().is_empty(), "stderr: {}", run.stderr());
}
