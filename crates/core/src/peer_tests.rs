// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::device::{Device, DeviceSource, DeviceSpec};

const LOST_AFTER: Duration = Duration::from_secs(30);
const DEFAULT: Duration = Duration::from_secs(60);

fn advert(spec: DeviceSpec) -> DeviceAdvert {
    Device::from_spec(spec, DeviceSource::Api, DEFAULT)
        .unwrap()
        .advert(None)
}

fn ids(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

fn directory_with_p2(now: Instant) -> PeerDirectory {
    let mut dir = PeerDirectory::new("node1", LOST_AFTER);
    dir.apply_gossip(
        "node2",
        ids(&["D2"]),
        Some(vec![advert(
            DeviceSpec::new("D2", "fence_dummy").param("pcmk_host_list", "nodeB"),
        )]),
        1,
        now,
    );
    dir
}

#[test]
fn first_gossip_joins_peer() {
    let now = Instant::now();
    let mut dir = PeerDirectory::new("node1", LOST_AFTER);
    assert!(dir.apply_gossip("node2", ids(&["D2"]), None, 1, now));
    assert!(!dir.apply_gossip("node2", ids(&["D2"]), None, 2, now));
    assert_eq!(dir.peers_that_have("D2"), vec!["node2"]);
}

#[test]
fn own_messages_are_ignored() {
    let mut dir = PeerDirectory::new("node1", LOST_AFTER);
    assert!(!dir.observe("node1", Instant::now()));
    assert!(dir.active_peers().is_empty());
}

#[test]
fn stale_epoch_is_ignored() {
    let now = Instant::now();
    let mut dir = directory_with_p2(now);
    dir.apply_gossip("node2", ids(&["D9"]), None, 0, now);
    assert_eq!(dir.peers_that_have("D2"), vec!["node2"]);
}

#[test]
fn heartbeat_drops_adverts_of_removed_devices() {
    let now = Instant::now();
    let mut dir = directory_with_p2(now);
    dir.apply_gossip("node2", ids(&[]), None, 2, now);
    assert!(dir.advert("node2", "D2").is_none());
}

#[test]
fn remote_candidates_follow_adverts() {
    let now = Instant::now();
    let dir = directory_with_p2(now);
    let found = dir.candidates_for("nodeB", Action::Off, vec![], DEFAULT);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].peer, "node2");
    assert_eq!(found[0].device, "D2");
    assert_eq!(found[0].rank, MatchRank::HostList);
    assert!(dir.candidates_for("nodeC", Action::Off, vec![], DEFAULT).is_empty());
}

#[test]
fn local_wins_ties() {
    let now = Instant::now();
    let dir = directory_with_p2(now);
    let local = vec![Candidate {
        peer: "node1".into(),
        device: "Z1".into(),
        rank: MatchRank::HostList,
        timeout: DEFAULT,
    }];
    let found = dir.candidates_for("nodeB", Action::Off, local, DEFAULT);
    let order: Vec<_> = found.iter().map(|c| c.device.as_str()).collect();
    assert_eq!(order, vec!["Z1", "D2"]);
}

#[test]
fn better_rank_beats_locality() {
    let now = Instant::now();
    let mut dir = PeerDirectory::new("node1", LOST_AFTER);
    dir.apply_gossip(
        "node2",
        ids(&["D2"]),
        Some(vec![advert(
            DeviceSpec::new("D2", "fence_apc").param("pcmk_host_map", "nodeB:4"),
        )]),
        1,
        now,
    );
    let local = vec![Candidate {
        peer: "node1".into(),
        device: "A1".into(),
        rank: MatchRank::Unrestricted,
        timeout: DEFAULT,
    }];
    let found = dir.candidates_for("nodeB", Action::Off, local, DEFAULT);
    assert_eq!(found[0].device, "D2");
}

#[test]
fn lost_peer_is_not_selected_but_retained() {
    let now = Instant::now();
    let mut dir = directory_with_p2(now);
    let lost = dir.expire(now + LOST_AFTER + Duration::from_secs(1));
    assert_eq!(lost, vec!["node2"]);
    assert!(!dir.is_active("node2"));
    assert!(dir.advert("node2", "D2").is_some());
    assert!(dir.candidates_for("nodeB", Action::Off, vec![], DEFAULT).is_empty());
    assert!(dir.peers_that_have("D2").is_empty());

    // traffic brings it back
    assert!(dir.observe("node2", now + Duration::from_secs(40)));
    assert!(dir.is_active("node2"));
}
