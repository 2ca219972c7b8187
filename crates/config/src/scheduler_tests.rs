// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::load_model;

fn pass(local: &str, content: &str) -> SchedulerPass {
    ConfigEvaluator::new(local).evaluate(&load_model(content).unwrap())
}

fn accepted_ids(pass: &SchedulerPass) -> Vec<String> {
    pass.accepted().map(|d| d.id.clone()).collect()
}

const FOUR_RESOURCES: &str = r#"
[[node]]
name = "node1"

[[primitive]]
id = "R1"
class = "stonith"
agent = "fence_dummy"

[[primitive]]
id = "R2"
class = "stonith"
agent = "fence_dummy"
meta = { target-role = "Stopped" }

[[primitive]]
id = "R3"
class = "stonith"
agent = "fence_dummy"

[[primitive]]
id = "R4"
class = "ocf"
agent = "Dummy"

[[location]]
resource = "R1"
node = "node1"
score = 100

[[location]]
resource = "R3"
node = "node1"
score = -1
"#;

#[test]
fn only_allowed_enabled_stonith_resources_survive() {
    let pass = pass("node1", FOUR_RESOURCES);
    assert_eq!(accepted_ids(&pass), vec!["R1"]);

    let errors: Vec<FilterError> = pass
        .devices
        .iter()
        .filter_map(|d| d.clone().err())
        .collect();
    assert_eq!(
        errors,
        vec![
            FilterError::Disabled("R2".into()),
            FilterError::NegativeScore {
                id: "R3".into(),
                score: "-1".into()
            },
            FilterError::NotStonith("R4".into()),
        ]
    );
}

#[test]
fn unknown_local_node_hosts_nothing() {
    let pass = pass("node9", FOUR_RESOURCES);
    assert!(accepted_ids(&pass).is_empty());
}

#[test]
fn clone_is_evaluated_once() {
    let pass = pass(
        "node1",
        r#"
[[node]]
name = "node1"

[[primitive]]
id = "fence-shared"
class = "stonith"
agent = "fence_scsi"
params = { devices = "/dev/sdb" }
meta = { provides = "unfencing" }

[[clone]]
id = "fence-shared-clone"
member = "fence-shared"
"#,
    );
    assert_eq!(pass.devices.len(), 1);
    let spec = pass.accepted().next().unwrap();
    assert_eq!(spec.agent, "fence_scsi");
    assert!(spec.provides_unfencing);
    assert_eq!(spec.params["devices"], "/dev/sdb");
}

#[test]
fn group_preference_applies_to_members() {
    let pass = pass(
        "node1",
        r#"
[[node]]
name = "node1"

[[primitive]]
id = "f1"
class = "stonith"
agent = "fence_dummy"

[[primitive]]
id = "f2"
class = "stonith"
agent = "fence_dummy"

[[group]]
id = "g1"
members = ["f1", "f2"]

[[location]]
resource = "f2"
node = "node1"
score = 10

[[location]]
resource = "g1"
node = "node1"
score = -5
"#,
    );
    assert!(accepted_ids(&pass).is_empty());
    assert!(matches!(
        &pass.devices[1],
        Err(FilterError::GroupNegativeScore { id, .. }) if id == "f2"
    ));
}

const WATCHDOG: &str = r#"
[options]
stonith-watchdog-timeout = "-1"

[[node]]
name = "node1"

[[primitive]]
id = "watchdog"
class = "stonith"
agent = "fence_watchdog"
"#;

#[test]
fn watchdog_skipped_without_timeout() {
    let pass = pass("node1", WATCHDOG);
    assert_eq!(pass.watchdog_timeout, Duration::ZERO);
    assert_eq!(
        pass.devices,
        vec![Err(FilterError::WatchdogDisabled("watchdog".into()))]
    );
}

#[test]
fn auto_watchdog_doubles_sbd_timeout() {
    let evaluator =
        ConfigEvaluator::new("node1").with_sbd_watchdog_timeout(Some(Duration::from_secs(5)));
    let pass = evaluator.evaluate(&load_model(WATCHDOG).unwrap());
    assert_eq!(pass.watchdog_timeout, Duration::from_secs(10));
    assert_eq!(accepted_ids(&pass), vec!["watchdog"]);
}

#[test]
fn missing_agent_is_reported() {
    let pass = pass(
        "node1",
        "[[node]]\nname = \"node1\"\n[[primitive]]\nid = \"f1\"\nclass = \"stonith\"\n",
    );
    assert_eq!(pass.devices, vec![Err(FilterError::MissingAgent("f1".into()))]);
}

#[test]
fn pass_carries_levels_hosts_and_timeout() {
    let pass = pass(
        "node1",
        r#"
[options]
stonith-timeout = "2min"

[[node]]
name = "node1"
id = 3

[[level]]
target-node-id = 3
index = 1
devices = "f1"
"#,
    );
    assert_eq!(pass.stonith_timeout, Some(Duration::from_secs(120)));
    assert_eq!(pass.hosts[0].node_id, Some(3));
    assert_eq!(pass.levels.len(), 1);
}
