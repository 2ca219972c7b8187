// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Applying a scheduler pass over the cluster configuration

use super::FencerCore;
use fenced_adapters::{AgentAdapter, NotifyAdapter, PeerAdapter};
use fenced_config::SchedulerPass;
use fenced_core::{Clock, DeviceSource, Event, IdGen};
use std::collections::BTreeSet;

/// What a configuration pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub rejected: Vec<String>,
    pub levels: usize,
}

impl ConfigDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl<A, P, N, C, I> FencerCore<A, P, N, C, I>
where
    A: AgentAdapter,
    P: PeerAdapter,
    N: NotifyAdapter,
    C: Clock,
    I: IdGen,
{
    /// Make the configuration-sourced devices and levels match `pass`.
    /// Client registrations survive unless the configuration names the
    /// same device.
    pub async fn apply_config(&self, pass: SchedulerPass) -> ConfigDelta {
        let agents = self.executor.agents().clone();
        let mut delta = ConfigDelta::default();
        {
            let mut guard = self.lock();
            let st = &mut *guard;
            st.registry.set_watchdog_timeout(pass.watchdog_timeout);
            st.cluster_timeout = pass.stonith_timeout;
            st.hosts = pass
                .hosts
                .iter()
                .map(|h| (h.name.clone(), h.clone()))
                .collect();

            for skipped in pass.devices.iter().filter_map(|d| d.as_ref().err()) {
                tracing::debug!(reason = %skipped, "device not hosted here");
            }

            let mut keep = BTreeSet::new();
            for spec in pass.accepted() {
                // Unchanged devices keep their cached probes
                let unchanged = st.registry.get(&spec.id).is_some_and(|d| {
                    d.source == DeviceSource::Config
                        && d.agent == spec.agent
                        && d.params == spec.params
                        && d.provides_unfencing == spec.provides_unfencing
                });
                if unchanged {
                    keep.insert(spec.id.clone());
                    continue;
                }
                match st.registry.register(spec.clone(), DeviceSource::Config, |agent| {
                    agents.is_installed(agent)
                }) {
                    Ok(_) => {
                        keep.insert(spec.id.clone());
                        delta.added.push(spec.id.clone());
                    }
                    Err(e) => {
                        tracing::warn!(device = %spec.id, error = %e, "configured device rejected");
                        delta.rejected.push(spec.id.clone());
                    }
                }
            }
            delta.removed = st.registry.retain_config_devices(&keep);

            let next: BTreeSet<_> = pass
                .levels
                .iter()
                .map(|l| (l.target.clone(), l.index))
                .collect();
            for (target, index) in st.config_levels.difference(&next) {
                st.topology.remove_level(target, *index);
            }
            let mut owned = BTreeSet::new();
            for level in &pass.levels {
                match st
                    .topology
                    .set_level(level.target.clone(), level.index, level.devices.clone())
                {
                    Ok(()) => {
                        owned.insert((level.target.clone(), level.index));
                    }
                    Err(e) => {
                        tracing::warn!(host = %level.target, index = level.index, error = %e, "configured level rejected");
                    }
                }
            }
            delta.levels = owned.len();
            st.config_levels = owned;
        }

        for device in &delta.added {
            self.emit(Event::DeviceRegistered {
                device: device.clone(),
            })
            .await;
        }
        for device in &delta.removed {
            self.emit(Event::DeviceRemoved {
                device: device.clone(),
            })
            .await;
        }
        if !delta.is_empty() {
            tracing::info!(
                added = delta.added.len(),
                removed = delta.removed.len(),
                levels = delta.levels,
                "configuration applied"
            );
            self.announce_devices().await;
        }
        delta
    }
}
