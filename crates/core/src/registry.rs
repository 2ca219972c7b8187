// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device registry
//!
//! Holds the devices this peer can drive. Capability probes (the agent's
//! `list` action) are tracked here but run elsewhere: the registry hands out
//! a [`ProbeTicket`] and later absorbs the result.

use crate::action::Action;
use crate::device::{
    Device, DeviceAdvert, DeviceSource, DeviceSpec, DeviceStatus, MatchRank, WATCHDOG_DEVICE,
};
use crate::error::RegisterError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

/// Registry tunables
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Timeout for actions without `pcmk_<action>_timeout`
    pub default_timeout: Duration,
    /// How long a `list` probe result stays valid
    pub probe_ttl: Duration,
    /// Watchdog timeout of the deployment; zero disables the watchdog device
    pub watchdog_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(60),
            probe_ttl: Duration::from_secs(120),
            watchdog_timeout: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Added,
    Replaced,
    /// Accepted but skipped by queries (watchdog without a watchdog timeout)
    Disabled,
}

/// Permission to run one capability probe
#[derive(Debug, Clone)]
pub struct ProbeTicket {
    pub device: Device,
    pub generation: u64,
}

#[derive(Debug, Clone)]
struct CachedProbe {
    targets: BTreeSet<String>,
    at: Instant,
}

#[derive(Debug, Clone)]
struct Entry {
    device: Device,
    generation: u64,
    probe: Option<CachedProbe>,
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    config: RegistryConfig,
    devices: BTreeMap<String, Entry>,
    /// Device id -> generation the in-flight probe was started against
    probing: HashMap<String, u64>,
    next_generation: u64,
}

impl DeviceRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn set_watchdog_timeout(&mut self, timeout: Duration) {
        self.config.watchdog_timeout = timeout;
        if let Some(entry) = self.devices.get_mut(WATCHDOG_DEVICE) {
            entry.device.disabled = timeout.is_zero();
        }
    }

    /// Register or replace a device. `agent_installed` reports whether the
    /// agent binary exists on disk.
    pub fn register(
        &mut self,
        spec: DeviceSpec,
        source: DeviceSource,
        agent_installed: impl Fn(&str) -> bool,
    ) -> Result<RegisterOutcome, RegisterError> {
        if is_disabled(&spec) {
            return Err(RegisterError::Disabled(spec.id));
        }
        let mut device = Device::from_spec(spec, source, self.config.default_timeout)?;

        let watchdog_off = device.id == WATCHDOG_DEVICE && self.config.watchdog_timeout.is_zero();
        if !watchdog_off && !agent_installed(&device.agent) {
            return Err(RegisterError::UnknownAgent(device.agent));
        }
        device.disabled = watchdog_off;

        self.next_generation += 1;
        let entry = Entry {
            device,
            generation: self.next_generation,
            probe: None,
        };
        let id = entry.device.id.clone();
        let replaced = self.devices.insert(id.clone(), entry).is_some();
        tracing::debug!(device = %id, replaced, disabled = watchdog_off, "device registered");

        Ok(if watchdog_off {
            RegisterOutcome::Disabled
        } else if replaced {
            RegisterOutcome::Replaced
        } else {
            RegisterOutcome::Added
        })
    }

    pub fn deregister(&mut self, id: &str) -> Option<Device> {
        self.devices.remove(id).map(|e| e.device)
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.get(id).map(|e| &e.device)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    /// Registered device ids, sorted
    pub fn list(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values().map(|e| &e.device)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn fresh_probe<'a>(&self, entry: &'a Entry, now: Instant) -> Option<&'a BTreeSet<String>> {
        entry
            .probe
            .as_ref()
            .filter(|p| now.saturating_duration_since(p.at) < self.config.probe_ttl)
            .map(|p| &p.targets)
    }

    /// Devices able to run `action` against `target`, best match first:
    /// host map, host list, probed list, unrestricted; ties by id.
    pub fn query(&self, target: &str, action: Action, now: Instant) -> Vec<String> {
        self.ranked(target, action, now)
            .into_iter()
            .map(|(_, id)| id)
            .collect()
    }

    /// Like [`query`](Self::query) but keeps the match rank
    pub fn ranked(&self, target: &str, action: Action, now: Instant) -> Vec<(MatchRank, String)> {
        let mut found: Vec<(MatchRank, String)> = self
            .devices
            .values()
            .filter(|e| !e.device.disabled && e.device.supports(action))
            .filter_map(|e| {
                let probed = self.fresh_probe(e, now);
                e.device
                    .can_target(target, probed)
                    .map(|rank| (rank, e.device.id.clone()))
            })
            .collect();
        found.sort();
        found
    }

    /// Devices whose capability is unknown until probed
    pub fn needs_probe(&self, action: Action, now: Instant) -> Vec<String> {
        self.devices
            .values()
            .filter(|e| !e.device.disabled && e.device.supports(action))
            .filter(|e| e.device.needs_probe() && self.fresh_probe(e, now).is_none())
            .map(|e| e.device.id.clone())
            .collect()
    }

    /// Every probe-driven device whose cache has expired and that isn't
    /// already being probed
    pub fn stale_probes(&self, now: Instant) -> Vec<String> {
        self.devices
            .values()
            .filter(|e| !e.device.disabled && e.device.needs_probe())
            .filter(|e| self.fresh_probe(e, now).is_none())
            .filter(|e| !self.probing.contains_key(&e.device.id))
            .map(|e| e.device.id.clone())
            .collect()
    }

    pub fn probe_in_flight(&self, id: &str) -> bool {
        self.probing.contains_key(id)
    }

    /// Start a probe unless one is already outstanding for this device
    pub fn begin_probe(&mut self, id: &str) -> Option<ProbeTicket> {
        if self.probing.contains_key(id) {
            return None;
        }
        let entry = self.devices.get(id)?;
        self.probing.insert(id.to_string(), entry.generation);
        Some(ProbeTicket {
            device: entry.device.clone(),
            generation: entry.generation,
        })
    }

    /// Absorb a probe result. The result is cached only when the device has
    /// not been re-registered since the probe started; returns whether it was.
    pub fn complete_probe(
        &mut self,
        id: &str,
        generation: u64,
        result: Result<BTreeSet<String>, String>,
        now: Instant,
        at: DateTime<Utc>,
    ) -> bool {
        if self.probing.get(id) == Some(&generation) {
            self.probing.remove(id);
        }
        let Some(entry) = self.devices.get_mut(id) else {
            return false;
        };
        if entry.generation != generation {
            tracing::debug!(device = id, "discarding probe of replaced device");
            return false;
        }
        match result {
            Ok(targets) => {
                entry.device.status = DeviceStatus::ConfirmedAvailable;
                entry.device.last_verified = Some(at);
                entry.probe = Some(CachedProbe { targets, at: now });
            }
            Err(reason) => {
                tracing::warn!(device = id, reason, "capability probe failed");
                entry.device.status = DeviceStatus::Unavailable;
                entry.probe = Some(CachedProbe {
                    targets: BTreeSet::new(),
                    at: now,
                });
            }
        }
        true
    }

    /// Record the outcome of a `status`/`monitor` run
    pub fn record_verification(&mut self, id: &str, ok: bool, at: DateTime<Utc>) {
        if let Some(entry) = self.devices.get_mut(id) {
            entry.device.status = if ok {
                DeviceStatus::ConfirmedAvailable
            } else {
                DeviceStatus::Unavailable
            };
            if ok {
                entry.device.last_verified = Some(at);
            }
        }
    }

    /// Capability adverts for gossip
    pub fn adverts(&self, now: Instant) -> Vec<DeviceAdvert> {
        self.devices
            .values()
            .filter(|e| !e.device.disabled)
            .map(|e| e.device.advert(self.fresh_probe(e, now)))
            .collect()
    }

    /// Drop configuration-sourced devices that a scheduler pass no longer
    /// yields. Client registrations are left alone.
    pub fn retain_config_devices(&mut self, keep: &BTreeSet<String>) -> Vec<String> {
        let stale: Vec<String> = self
            .devices
            .values()
            .filter(|e| e.device.source == DeviceSource::Config && !keep.contains(&e.device.id))
            .map(|e| e.device.id.clone())
            .collect();
        for id in &stale {
            self.devices.remove(id);
        }
        stale
    }

    /// Any enabled device that can restore access to a node
    pub fn has_unfencing_device(&self) -> bool {
        self.devices
            .values()
            .any(|e| !e.device.disabled && e.device.provides_unfencing)
    }
}

fn is_disabled(spec: &DeviceSpec) -> bool {
    let role = spec.params.get("target-role").map(|s| s.to_ascii_lowercase());
    let disabled = spec.params.get("disabled").map(|s| s.to_ascii_lowercase());
    role.as_deref() == Some("stopped") || matches!(disabled.as_deref(), Some("true" | "1" | "yes"))
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
