// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;

fn installed(_: &str) -> bool {
    true
}

fn registry() -> DeviceRegistry {
    DeviceRegistry::new(RegistryConfig::default())
}

fn list(targets: &[&str]) -> BTreeSet<String> {
    targets.iter().map(|t| t.to_string()).collect()
}

#[test]
fn register_is_idempotent_and_replaces() {
    let mut reg = registry();
    let spec = DeviceSpec::new("D1", "fence_dummy").param("pcmk_host_list", "nodeA");
    assert_eq!(
        reg.register(spec.clone(), DeviceSource::Api, installed),
        Ok(RegisterOutcome::Added)
    );
    let spec2 = DeviceSpec::new("D1", "fence_dummy").param("pcmk_host_list", "nodeB");
    assert_eq!(
        reg.register(spec2, DeviceSource::Api, installed),
        Ok(RegisterOutcome::Replaced)
    );
    assert_eq!(reg.list(), vec!["D1"]);
    assert!(reg.query("nodeA", Action::Off, Instant::now()).is_empty());
    assert_eq!(reg.query("nodeB", Action::Off, Instant::now()), vec!["D1"]);
}

#[test]
fn missing_agent_is_rejected() {
    let mut reg = registry();
    let err = reg
        .register(DeviceSpec::new("D1", "fence_missing"), DeviceSource::Api, |_| false)
        .unwrap_err();
    assert_eq!(err, RegisterError::UnknownAgent("fence_missing".into()));
    assert!(reg.is_empty());
}

#[test]
fn bad_parameters_leave_registry_unchanged() {
    let mut reg = registry();
    reg.register(DeviceSpec::new("D1", "fence_dummy"), DeviceSource::Api, installed)
        .unwrap();
    let bad = DeviceSpec::new("D1", "fence_dummy").param("pcmk_host_map", "oops");
    assert!(matches!(
        reg.register(bad, DeviceSource::Api, installed),
        Err(RegisterError::BadParameters(_))
    ));
    assert!(reg.get("D1").unwrap().host_map.is_empty());
}

#[test]
fn stopped_resource_is_disabled() {
    let mut reg = registry();
    let spec = DeviceSpec::new("D1", "fence_dummy").param("target-role", "Stopped");
    assert_eq!(
        reg.register(spec, DeviceSource::Api, installed),
        Err(RegisterError::Disabled("D1".into()))
    );
}

#[test]
fn watchdog_without_timeout_is_registered_but_skipped() {
    let mut reg = registry();
    let spec = DeviceSpec::new(WATCHDOG_DEVICE, "fence_watchdog").param("pcmk_host_check", "none");
    assert_eq!(
        reg.register(spec, DeviceSource::Config, |_| false),
        Ok(RegisterOutcome::Disabled)
    );
    assert_eq!(reg.list(), vec![WATCHDOG_DEVICE]);
    assert!(reg.query("nodeA", Action::Off, Instant::now()).is_empty());

    reg.set_watchdog_timeout(Duration::from_secs(10));
    assert_eq!(reg.query("nodeA", Action::Off, Instant::now()), vec![WATCHDOG_DEVICE]);
}

#[test]
fn query_orders_by_rank_then_id() {
    let mut reg = registry();
    let now = Instant::now();
    for spec in [
        DeviceSpec::new("Z-any", "fence_dummy").param("pcmk_host_check", "none"),
        DeviceSpec::new("A-any", "fence_dummy").param("pcmk_host_check", "none"),
        DeviceSpec::new("M-list", "fence_dummy").param("pcmk_host_list", "nodeA"),
        DeviceSpec::new("Y-map", "fence_dummy").param("pcmk_host_map", "nodeA:3"),
        DeviceSpec::new("B-probe", "fence_dummy"),
    ] {
        reg.register(spec, DeviceSource::Api, installed).unwrap();
    }
    let ticket = reg.begin_probe("B-probe").unwrap();
    reg.complete_probe("B-probe", ticket.generation, Ok(list(&["nodeA"])), now, Utc::now());

    assert_eq!(
        reg.query("nodeA", Action::Off, now),
        vec!["Y-map", "M-list", "B-probe", "A-any", "Z-any"]
    );
}

#[test]
fn query_filters_unsupported_actions() {
    let mut reg = registry();
    reg.register(
        DeviceSpec::new("D1", "fence_dummy")
            .param("pcmk_host_list", "nodeA")
            .param("pcmk_supported_actions", "off on"),
        DeviceSource::Api,
        installed,
    )
    .unwrap();
    assert_eq!(reg.query("nodeA", Action::Off, Instant::now()), vec!["D1"]);
    assert!(reg.query("nodeA", Action::Reboot, Instant::now()).is_empty());
}

#[test]
fn concurrent_probes_are_deduplicated() {
    let mut reg = registry();
    reg.register(DeviceSpec::new("D1", "fence_ipmi"), DeviceSource::Api, installed)
        .unwrap();
    assert!(reg.begin_probe("D1").is_some());
    assert!(reg.begin_probe("D1").is_none());
    assert!(reg.probe_in_flight("D1"));
}

#[test]
fn probe_of_replaced_device_is_not_cached() {
    let mut reg = registry();
    let now = Instant::now();
    reg.register(DeviceSpec::new("D1", "fence_ipmi"), DeviceSource::Api, installed)
        .unwrap();
    let ticket = reg.begin_probe("D1").unwrap();
    reg.register(DeviceSpec::new("D1", "fence_ipmi"), DeviceSource::Api, installed)
        .unwrap();

    let cached = reg.complete_probe("D1", ticket.generation, Ok(list(&["nodeA"])), now, Utc::now());
    assert!(!cached);
    assert!(reg.query("nodeA", Action::Off, now).is_empty());
    assert_eq!(reg.needs_probe(Action::Off, now), vec!["D1"]);
}

#[test]
fn probe_cache_expires_after_ttl() {
    let mut reg = registry();
    let now = Instant::now();
    reg.register(DeviceSpec::new("D1", "fence_ipmi"), DeviceSource::Api, installed)
        .unwrap();
    let ticket = reg.begin_probe("D1").unwrap();
    reg.complete_probe("D1", ticket.generation, Ok(list(&["nodeA"])), now, Utc::now());

    assert_eq!(reg.query("nodeA", Action::Off, now + Duration::from_secs(60)), vec!["D1"]);
    let later = now + Duration::from_secs(121);
    assert!(reg.query("nodeA", Action::Off, later).is_empty());
    assert_eq!(reg.stale_probes(later), vec!["D1"]);
}

#[test]
fn failed_probe_marks_unavailable() {
    let mut reg = registry();
    let now = Instant::now();
    reg.register(DeviceSpec::new("D1", "fence_ipmi"), DeviceSource::Api, installed)
        .unwrap();
    let ticket = reg.begin_probe("D1").unwrap();
    reg.complete_probe("D1", ticket.generation, Err("exit 1".into()), now, Utc::now());
    assert_eq!(reg.get("D1").unwrap().status, DeviceStatus::Unavailable);
    assert!(reg.needs_probe(Action::Off, now).is_empty());
}

#[test]
fn retain_config_devices_spares_api_devices() {
    let mut reg = registry();
    reg.register(DeviceSpec::new("cfg1", "fence_dummy"), DeviceSource::Config, installed)
        .unwrap();
    reg.register(DeviceSpec::new("cfg2", "fence_dummy"), DeviceSource::Config, installed)
        .unwrap();
    reg.register(DeviceSpec::new("api", "fence_dummy"), DeviceSource::Api, installed)
        .unwrap();

    let keep: BTreeSet<String> = ["cfg2".to_string()].into_iter().collect();
    assert_eq!(reg.retain_config_devices(&keep), vec!["cfg1"]);
    assert_eq!(reg.list(), vec!["api", "cfg2"]);
}
