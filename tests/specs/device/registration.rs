//! Device and level registration specs

use crate::prelude::*;

fn running_with_dummy() -> Project {
    let mut project = Project::empty();
    project.agent("fence_dummy", DUMMY_AGENT);
    project.start_daemon();
    project
}

#[test]
fn installed_agents_are_listed() {
    let project = running_with_dummy();
    project.agent("fence_other", DUMMY_AGENT);

    project
        .admin()
        .args(&["--list-installed"])
        .passes()
        .stdout_has("fence_dummy")
        .stdout_has("fence_other");
}

#[test]
fn registered_device_is_listed() {
    let project = running_with_dummy();

    project
        .admin()
        .args(&[
            "--register", "d1", "--agent", "fence_dummy", "-o", "pcmk_host_list=node2 node3",
        ])
        .passes()
        .stdout_has("Registered device d1");

    project
        .admin()
        .args(&["--list-registered"])
        .passes()
        .stdout_eq("d1\n");
}

#[test]
fn registering_again_replaces() {
    let project = running_with_dummy();
    let register = [
        "--register", "d1", "--agent", "fence_dummy", "-o", "pcmk_host_list=node2",
    ];

    project.admin().args(&register).passes();
    project
        .admin()
        .args(&register)
        .passes()
        .stdout_has("Replaced device d1");
}

#[test]
fn unknown_agent_is_rejected() {
    let project = running_with_dummy();

    project
        .admin()
        .args(&["--register", "d1", "--agent", "fence_missing"])
        .exits_with(2)
        .stderr_has("UnknownAgent");
}

#[test]
fn list_ranks_devices_for_a_host() {
    let project = running_with_dummy();
    project
        .admin()
        .args(&[
            "--register", "d1", "--agent", "fence_dummy", "-o", "pcmk_host_list=node2",
        ])
        .passes();

    project
        .admin()
        .args(&["--list", "node2"])
        .passes()
        .stdout_has("d1")
        .stdout_has("host-list");

    project
        .admin()
        .args(&["--list", "node9"])
        .passes()
        .stdout_has("No devices can fence node9");
}

#[test]
fn deregistering_an_unknown_device_fails() {
    let project = running_with_dummy();

    project
        .admin()
        .args(&["--deregister", "nope"])
        .exits_with(6)
        .stderr_has("nope");
}

#[test]
fn levels_register_and_deregister() {
    let project = running_with_dummy();
    project
        .admin()
        .args(&[
            "--register", "d1", "--agent", "fence_dummy", "-o", "pcmk_host_list=node2",
        ])
        .passes();

    project
        .admin()
        .args(&["--register-level", "node2", "--index", "1", "--device", "d1"])
        .passes()
        .stdout_has("Registered level 1 for node2 (1 device)");

    project
        .admin()
        .args(&["--deregister-level", "node2", "--index", "1"])
        .passes();

    project
        .admin()
        .args(&["--deregister-level", "node2", "--index", "1"])
        .exits_with(6);
}

#[test]
fn device_status_runs_the_monitor() {
    let project = running_with_dummy();
    project
        .admin()
        .args(&[
            "--register", "d1", "--agent", "fence_dummy", "-o", "pcmk_host_list=node2",
        ])
        .passes();

    project
        .admin()
        .args(&["--query", "d1", "--timeout", "10"])
        .passes()
        .stdout_has("d1: OK");
}

#[test]
fn metadata_is_printed() {
    let project = running_with_dummy();

    project
        .admin()
        .args(&["--metadata", "--agent", "fence_dummy"])
        .passes()
        .stdout_has("resource-agent");
}
