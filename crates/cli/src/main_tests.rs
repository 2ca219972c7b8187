// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clap::CommandFactory;
use fenced_core::Action;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("fence-admin").chain(args.iter().copied())).unwrap()
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn fence_flags_pick_the_action() {
    for (flag, action) in [
        ("--fence", Action::Off),
        ("--reboot", Action::Reboot),
        ("--unfence", Action::On),
        ("--confirm", Action::Confirm),
    ] {
        let cli = parse(&[flag, "node3"]);
        assert_eq!(
            cli.selected(),
            Some(Command::Fence {
                target: "node3".to_string(),
                action,
            })
        );
    }
}

#[test]
fn history_star_means_every_host() {
    assert_eq!(parse(&["-H", "*"]).selected(), Some(Command::History { target: None }));
    assert_eq!(
        parse(&["-H", "node2"]).selected(),
        Some(Command::History {
            target: Some("node2".to_string())
        })
    );
}

#[test]
fn register_collects_options() {
    let cli = parse(&[
        "-R",
        "ipmi-1",
        "-a",
        "fence_ipmilan",
        "-o",
        "ip=10.0.0.5",
        "-o",
        "pcmk_host_list=node2 node3",
        "--unfencing",
    ]);
    let Some(Command::Register {
        device,
        agent,
        params,
        unfencing,
    }) = cli.selected()
    else {
        panic!("expected a registration");
    };
    assert_eq!(device, "ipmi-1");
    assert_eq!(agent, "fence_ipmilan");
    assert_eq!(params["ip"], "10.0.0.5");
    assert_eq!(params["pcmk_host_list"], "node2 node3");
    assert!(unfencing);
}

#[test]
fn option_values_may_contain_equals() {
    assert_eq!(
        parse_key_val("pcmk_host_map=node1:1;node2=2").unwrap(),
        ("pcmk_host_map".to_string(), "node1:1;node2=2".to_string())
    );
    assert!(parse_key_val("=x").is_err());
}

#[test]
fn level_devices_keep_their_order() {
    let cli = parse(&[
        "-r", "@node[0-9]+", "-i", "2", "--device", "d2", "--device", "d1",
    ]);
    assert_eq!(
        cli.selected(),
        Some(Command::RegisterLevel {
            target: "@node[0-9]+".to_string(),
            index: 2,
            devices: vec!["d2".to_string(), "d1".to_string()],
        })
    );
}

#[test]
fn modifiers_become_options() {
    let cli = parse(&[
        "-F",
        "node2",
        "-t",
        "90",
        "--tolerance",
        "30",
        "--async",
        "--allow-self-fencing",
        "--client-id",
        "ops",
    ]);
    let options = cli.options();
    assert_eq!(options.timeout, Some(Duration::from_secs(90)));
    assert_eq!(options.tolerance, Some(Duration::from_secs(30)));
    assert!(options.detach);
    assert!(options.allow_self_fencing);
    assert_eq!(options.client_id.as_deref(), Some("ops"));
}

#[test]
fn two_commands_are_rejected() {
    let result = Cli::try_parse_from(["fence-admin", "-L", "-I"]);
    assert!(result.is_err());
}
