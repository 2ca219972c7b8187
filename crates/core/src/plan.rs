// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Turning a fencing request into a plan of levels
//!
//! With topology, each configured level becomes a planned level whose
//! devices resolve to a local registration or, failing that, the first
//! active peer advertising the device for the target. A level with any
//! unresolvable device is skipped since it could never succeed as a whole.
//!
//! Without topology, every candidate becomes its own level, local devices
//! first, so the next candidate is tried when one fails.

use crate::action::Action;
use crate::operation::{Attempt, PlannedLevel};
use crate::peer::{Candidate, PeerDirectory};
use crate::registry::DeviceRegistry;
use crate::topology::{HostInfo, TopologyTable};
use std::time::Instant;

/// Everything the planner consults
pub struct PlanInputs<'a> {
    pub topology: &'a TopologyTable,
    pub registry: &'a DeviceRegistry,
    pub peers: &'a PeerDirectory,
}

impl PlanInputs<'_> {
    /// Build the level sequence for `action` against `host`
    pub fn plan(&self, host: &HostInfo, action: Action, now: Instant) -> Vec<PlannedLevel> {
        if self.topology.has_levels(host) {
            self.from_topology(host, action, now)
        } else {
            self.pseudo_levels(&host.name, action, now)
        }
    }

    /// All candidates for the target, local and remote, best first
    pub fn candidates(&self, target: &str, action: Action, now: Instant) -> Vec<Candidate> {
        let local_name = self.peers.local();
        let default_timeout = self.registry.config().default_timeout;
        let local: Vec<Candidate> = self
            .registry
            .ranked(target, action, now)
            .into_iter()
            .filter_map(|(rank, id)| {
                self.registry.get(&id).map(|device| Candidate {
                    peer: local_name.to_string(),
                    device: id,
                    rank,
                    timeout: device.timeout_for(action),
                })
            })
            .collect();
        self.peers
            .candidates_for(target, action, local, default_timeout)
    }

    fn pseudo_levels(&self, target: &str, action: Action, now: Instant) -> Vec<PlannedLevel> {
        self.candidates(target, action, now)
            .into_iter()
            .map(|c| PlannedLevel {
                index: 0,
                attempts: vec![Attempt {
                    level: 0,
                    device: c.device,
                    peer: c.peer,
                    timeout: c.timeout,
                }],
            })
            .collect()
    }

    fn from_topology(&self, host: &HostInfo, action: Action, now: Instant) -> Vec<PlannedLevel> {
        let candidates = self.candidates(&host.name, action, now);
        let mut planned = Vec::new();
        for level in self.topology.levels_for(host) {
            let resolved: Option<Vec<Attempt>> = level
                .devices
                .iter()
                .map(|device| {
                    let local = candidates
                        .iter()
                        .find(|c| &c.device == device && c.peer == self.peers.local());
                    local
                        .or_else(|| candidates.iter().find(|c| &c.device == device))
                        .map(|c| Attempt {
                            level: level.index,
                            device: c.device.clone(),
                            peer: c.peer.clone(),
                            timeout: c.timeout,
                        })
                })
                .collect();
            match resolved {
                Some(attempts) => planned.push(PlannedLevel {
                    index: level.index,
                    attempts,
                }),
                None => {
                    tracing::info!(
                        target = %host.name,
                        level = level.index,
                        "skipping level with unavailable device"
                    );
                }
            }
        }
        planned
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
