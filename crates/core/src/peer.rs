// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer directory: which peers can drive which devices
//!
//! Fed by `DeviceGossip`. A peer is joined on its first message and lost
//! when it stops gossiping; lost peers keep their snapshot so operations
//! already waiting on them can finish, but they are never selected again.

use crate::action::Action;
use crate::device::{DeviceAdvert, MatchRank};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerState {
    Active,
    Lost,
}

#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub name: String,
    pub device_ids: BTreeSet<String>,
    pub adverts: BTreeMap<String, DeviceAdvert>,
    pub epoch: u64,
    pub last_seen: Instant,
    pub state: PeerState,
}

/// Who can run a device, and how well it matches the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub peer: String,
    pub device: String,
    pub rank: MatchRank,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct PeerDirectory {
    local: String,
    peers: BTreeMap<String, PeerRecord>,
    /// Silence after which an active peer is considered lost
    lost_after: Duration,
}

impl PeerDirectory {
    pub fn new(local: impl Into<String>, lost_after: Duration) -> Self {
        Self {
            local: local.into(),
            peers: BTreeMap::new(),
            lost_after,
        }
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    /// Note traffic from a peer. Returns true when the peer (re)joined.
    pub fn observe(&mut self, peer: &str, now: Instant) -> bool {
        if peer == self.local {
            return false;
        }
        match self.peers.get_mut(peer) {
            Some(record) => {
                record.last_seen = now;
                let rejoined = record.state == PeerState::Lost;
                record.state = PeerState::Active;
                rejoined
            }
            None => {
                self.peers.insert(
                    peer.to_string(),
                    PeerRecord {
                        name: peer.to_string(),
                        device_ids: BTreeSet::new(),
                        adverts: BTreeMap::new(),
                        epoch: 0,
                        last_seen: now,
                        state: PeerState::Active,
                    },
                );
                true
            }
        }
    }

    /// Apply a gossip message. A full snapshot carries adverts; a heartbeat
    /// only device ids. Returns true when the peer (re)joined.
    pub fn apply_gossip(
        &mut self,
        peer: &str,
        device_ids: BTreeSet<String>,
        adverts: Option<Vec<DeviceAdvert>>,
        epoch: u64,
        now: Instant,
    ) -> bool {
        let joined = self.observe(peer, now);
        let Some(record) = self.peers.get_mut(peer) else {
            return joined;
        };
        if epoch < record.epoch {
            tracing::debug!(peer, epoch, known = record.epoch, "ignoring stale gossip");
            return joined;
        }
        record.epoch = epoch;
        match adverts {
            Some(adverts) => {
                record.adverts = adverts.into_iter().map(|a| (a.id.clone(), a)).collect();
            }
            None => record.adverts.retain(|id, _| device_ids.contains(id)),
        }
        record.device_ids = device_ids;
        joined
    }

    /// Transport reported the peer gone
    pub fn mark_lost(&mut self, peer: &str) -> bool {
        match self.peers.get_mut(peer) {
            Some(record) if record.state == PeerState::Active => {
                record.state = PeerState::Lost;
                true
            }
            _ => false,
        }
    }

    /// Mark silent peers lost; returns the newly lost names
    pub fn expire(&mut self, now: Instant) -> Vec<String> {
        let mut lost = Vec::new();
        for record in self.peers.values_mut() {
            if record.state == PeerState::Active
                && now.saturating_duration_since(record.last_seen) > self.lost_after
            {
                record.state = PeerState::Lost;
                lost.push(record.name.clone());
            }
        }
        lost
    }

    pub fn is_active(&self, peer: &str) -> bool {
        self.peers
            .get(peer)
            .is_some_and(|r| r.state == PeerState::Active)
    }

    pub fn active_peers(&self) -> Vec<String> {
        self.peers
            .values()
            .filter(|r| r.state == PeerState::Active)
            .map(|r| r.name.clone())
            .collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.values()
    }

    /// Active peers that have `device_id` registered
    pub fn peers_that_have(&self, device_id: &str) -> Vec<String> {
        self.peers
            .values()
            .filter(|r| r.state == PeerState::Active && r.device_ids.contains(device_id))
            .map(|r| r.name.clone())
            .collect()
    }

    /// Advert of a device on a given peer
    pub fn advert(&self, peer: &str, device_id: &str) -> Option<&DeviceAdvert> {
        self.peers.get(peer).and_then(|r| r.adverts.get(device_id))
    }

    /// Remote devices able to run `action` against `target`, merged with the
    /// local candidates. Better rank first; on equal rank local devices win,
    /// then device id.
    pub fn candidates_for(
        &self,
        target: &str,
        action: Action,
        local: Vec<Candidate>,
        default_timeout: Duration,
    ) -> Vec<Candidate> {
        let mut all = local;
        for record in self.peers.values() {
            if record.state != PeerState::Active {
                continue;
            }
            for advert in record.adverts.values() {
                if !record.device_ids.contains(&advert.id) || !advert.supports(action) {
                    continue;
                }
                if let Some(rank) = advert.can_target(target) {
                    all.push(Candidate {
                        peer: record.name.clone(),
                        device: advert.id.clone(),
                        rank,
                        timeout: advert.timeout_for(action, default_timeout),
                    });
                }
            }
        }
        let local_name = self.local.clone();
        all.sort_by(|a, b| {
            (a.rank, a.peer != local_name, &a.device, &a.peer).cmp(&(
                b.rank,
                b.peer != local_name,
                &b.device,
                &b.peer,
            ))
        });
        all
    }

    /// Any active peer advertising an unfencing-capable device
    pub fn any_unfencing(&self) -> bool {
        self.peers
            .values()
            .filter(|r| r.state == PeerState::Active)
            .flat_map(|r| r.adverts.values())
            .any(|a| a.provides_unfencing)
    }

    /// Any active peer advertising `action` for `target`
    pub fn any_supports(&self, target: &str, action: Action) -> bool {
        self.peers
            .values()
            .filter(|r| r.state == PeerState::Active)
            .flat_map(|r| r.adverts.values())
            .any(|a| a.supports(action) && a.can_target(target).is_some())
    }
}

#[cfg(test)]
#[path = "peer_tests.rs"]
mod tests;
