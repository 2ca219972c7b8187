// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fencing devices and their capabilities
//!
//! A [`DeviceSpec`] is what a client or the configuration hands in; a
//! [`Device`] is the validated form with host mappings and per-action
//! overrides parsed out of the `pcmk_*` parameters.

use crate::action::Action;
use crate::error::RegisterError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Reserved id of the watchdog self-fencing device
pub const WATCHDOG_DEVICE: &str = "watchdog";

/// Retries per action when `pcmk_<action>_retries` is not set
pub const DEFAULT_RETRIES: u32 = 2;

const PARAM_HOST_LIST: &str = "pcmk_host_list";
const PARAM_HOST_MAP: &str = "pcmk_host_map";
const PARAM_HOST_CHECK: &str = "pcmk_host_check";
const PARAM_HOST_ARGUMENT: &str = "pcmk_host_argument";
const PARAM_SUPPORTED_ACTIONS: &str = "pcmk_supported_actions";

/// Device registration request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub id: String,
    pub agent: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Device can restore access to a fenced node (`provides=unfencing`)
    #[serde(default)]
    pub provides_unfencing: bool,
}

impl DeviceSpec {
    pub fn new(id: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            agent: agent.into(),
            ..Default::default()
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn unfencing(mut self) -> Self {
        self.provides_unfencing = true;
        self
    }
}

/// Where a registration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSource {
    /// Registered by a client over IPC
    Api,
    /// Derived from the cluster configuration by the scheduler pass
    Config,
}

/// How the device decides which hosts it can fence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostCheck {
    /// Ask the agent with its `list` action
    DynamicList,
    /// Only the configured host list / host map
    StaticList,
    /// Every host
    None,
}

impl std::str::FromStr for HostCheck {
    type Err = RegisterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dynamic-list" => Ok(HostCheck::DynamicList),
            "static-list" => Ok(HostCheck::StaticList),
            "none" => Ok(HostCheck::None),
            other => Err(RegisterError::BadParameters(format!(
                "{PARAM_HOST_CHECK}: unknown mode '{other}'"
            ))),
        }
    }
}

/// Observed availability of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceStatus {
    #[default]
    Unknown,
    ConfirmedAvailable,
    Unavailable,
}

/// Why a device claims a target. Lower ranks sort first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchRank {
    HostMap,
    HostList,
    Probed,
    Unrestricted,
}

impl MatchRank {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchRank::HostMap => "host-map",
            MatchRank::HostList => "host-list",
            MatchRank::Probed => "probed",
            MatchRank::Unrestricted => "unrestricted",
        }
    }
}

/// A validated, registered device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub agent: String,
    /// Parameters as registered, `pcmk_*` included
    pub params: BTreeMap<String, String>,
    pub host_list: BTreeSet<String>,
    /// Target name to agent port/alias
    pub host_map: BTreeMap<String, String>,
    pub host_check: HostCheck,
    /// Agent argument carrying the port; `None` when suppressed
    pub host_argument: Option<String>,
    /// Action substitutions from `pcmk_<action>_action`
    pub action_aliases: BTreeMap<Action, String>,
    pub timeouts: BTreeMap<Action, Duration>,
    pub retries: BTreeMap<Action, u32>,
    pub supported: BTreeSet<Action>,
    pub provides_unfencing: bool,
    pub status: DeviceStatus,
    pub last_verified: Option<DateTime<Utc>>,
    pub disabled: bool,
    pub source: DeviceSource,
}

impl Device {
    /// Validate a spec. `default_timeout` applies to actions without an
    /// explicit `pcmk_<action>_timeout`.
    pub fn from_spec(
        spec: DeviceSpec,
        source: DeviceSource,
        default_timeout: Duration,
    ) -> Result<Device, RegisterError> {
        if spec.id.trim().is_empty() || spec.id.chars().any(char::is_whitespace) {
            return Err(RegisterError::BadParameters(format!(
                "invalid device id '{}'",
                spec.id
            )));
        }
        if spec.agent.trim().is_empty() || spec.agent.contains('/') {
            return Err(RegisterError::BadParameters(format!(
                "invalid agent name '{}'",
                spec.agent
            )));
        }
        for (key, value) in &spec.params {
            if key.is_empty() || key.contains('=') || key.chars().any(char::is_whitespace) {
                return Err(RegisterError::BadParameters(format!(
                    "invalid parameter name '{key}'"
                )));
            }
            if value.contains('\n') || value.contains('\0') {
                return Err(RegisterError::BadParameters(format!(
                    "parameter '{key}' contains a line break"
                )));
            }
        }

        let host_list: BTreeSet<String> = spec
            .params
            .get(PARAM_HOST_LIST)
            .map(|v| split_targets(v).into_iter().collect())
            .unwrap_or_default();
        let host_map = match spec.params.get(PARAM_HOST_MAP) {
            Some(raw) => parse_host_map(raw)?,
            None => BTreeMap::new(),
        };
        let host_check = match spec.params.get(PARAM_HOST_CHECK) {
            Some(raw) => raw.parse()?,
            None if !host_list.is_empty() || !host_map.is_empty() => HostCheck::StaticList,
            None => HostCheck::DynamicList,
        };
        let host_argument = match spec.params.get(PARAM_HOST_ARGUMENT).map(String::as_str) {
            Some("none") => None,
            Some(arg) => Some(arg.to_string()),
            None => Some("port".to_string()),
        };

        let mut action_aliases = BTreeMap::new();
        let mut timeouts = BTreeMap::new();
        let mut retries = BTreeMap::new();
        for action in Action::ALL {
            let name = action.as_str();
            if let Some(alias) = spec.params.get(&format!("pcmk_{name}_action")) {
                action_aliases.insert(action, alias.clone());
            }
            let timeout = match spec.params.get(&format!("pcmk_{name}_timeout")) {
                Some(raw) => parse_timeout(raw).ok_or_else(|| {
                    RegisterError::BadParameters(format!("pcmk_{name}_timeout: '{raw}'"))
                })?,
                None => default_timeout,
            };
            timeouts.insert(action, timeout);
            let count = match spec.params.get(&format!("pcmk_{name}_retries")) {
                Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                    RegisterError::BadParameters(format!("pcmk_{name}_retries: '{raw}'"))
                })?,
                None => DEFAULT_RETRIES,
            };
            retries.insert(action, count);
        }

        let supported = match spec.params.get(PARAM_SUPPORTED_ACTIONS) {
            Some(raw) => {
                let mut set = BTreeSet::new();
                for token in split_targets(raw) {
                    let action = token.parse::<Action>().map_err(|e| {
                        RegisterError::BadParameters(format!("{PARAM_SUPPORTED_ACTIONS}: {e}"))
                    })?;
                    set.insert(action);
                }
                set
            }
            None => default_supported_actions(),
        };

        Ok(Device {
            id: spec.id,
            agent: spec.agent,
            params: spec.params,
            host_list,
            host_map,
            host_check,
            host_argument,
            action_aliases,
            timeouts,
            retries,
            supported,
            provides_unfencing: spec.provides_unfencing,
            status: DeviceStatus::Unknown,
            last_verified: None,
            disabled: false,
            source,
        })
    }

    /// Whether the device claims `target`, and how strongly.
    /// `probed` is the cached result of the agent's `list` action, if fresh.
    pub fn can_target(&self, target: &str, probed: Option<&BTreeSet<String>>) -> Option<MatchRank> {
        if self.host_check == HostCheck::None {
            return Some(MatchRank::Unrestricted);
        }
        if self.host_map.contains_key(target) {
            return Some(MatchRank::HostMap);
        }
        if self.host_list.contains(target) {
            return Some(MatchRank::HostList);
        }
        match (self.host_check, probed) {
            (HostCheck::DynamicList, Some(list)) if list.contains(target) => {
                Some(MatchRank::Probed)
            }
            _ => None,
        }
    }

    /// Capability depends on the agent's `list` output
    pub fn needs_probe(&self) -> bool {
        self.host_check == HostCheck::DynamicList
            && self.host_list.is_empty()
            && self.host_map.is_empty()
    }

    pub fn supports(&self, action: Action) -> bool {
        match action {
            Action::On => self.supported.contains(&Action::On) || self.provides_unfencing,
            Action::Confirm => false,
            other => self.supported.contains(&other),
        }
    }

    pub fn timeout_for(&self, action: Action) -> Duration {
        self.timeouts
            .get(&action)
            .copied()
            .unwrap_or(Duration::from_secs(60))
    }

    pub fn retries_for(&self, action: Action) -> u32 {
        self.retries.get(&action).copied().unwrap_or(DEFAULT_RETRIES)
    }

    /// Agent action name after `pcmk_<action>_action` substitution
    pub fn mapped_action(&self, action: Action) -> String {
        self.action_aliases
            .get(&action)
            .cloned()
            .unwrap_or_else(|| action.as_str().to_string())
    }

    /// Port/alias the agent knows the target by
    pub fn port_for<'a>(&'a self, target: &'a str) -> &'a str {
        self.host_map.get(target).map(String::as_str).unwrap_or(target)
    }

    /// Arguments handed to the agent: action, target name, port, then every
    /// device parameter that isn't a fencer directive. Explicit parameters
    /// override the derived ones.
    pub fn agent_args(&self, action: Action, target: Option<&str>) -> Vec<(String, String)> {
        let mut args: BTreeMap<String, String> = BTreeMap::new();
        args.insert("action".to_string(), self.mapped_action(action));
        if let Some(target) = target {
            args.insert("nodename".to_string(), target.to_string());
            if let Some(arg) = &self.host_argument {
                let explicit = self
                    .params
                    .get(arg)
                    .is_some_and(|v| !v.is_empty() && v != "dynamic");
                if !explicit {
                    args.insert(arg.clone(), self.port_for(target).to_string());
                }
            }
        }
        for (key, value) in &self.params {
            if key.starts_with("pcmk_") || key.starts_with("CRM_meta") || key == "action" {
                continue;
            }
            args.insert(key.clone(), value.clone());
        }
        // keep `action` first for agents reading stdin in order
        let action_arg = args.remove_entry("action");
        action_arg.into_iter().chain(args).collect()
    }

    /// Compact capability summary published to peers
    pub fn advert(&self, probed: Option<&BTreeSet<String>>) -> DeviceAdvert {
        DeviceAdvert {
            id: self.id.clone(),
            host_check: self.host_check,
            host_list: self.host_list.clone(),
            host_map: self.host_map.keys().cloned().collect(),
            probed: probed.cloned(),
            actions: self.supported.clone(),
            provides_unfencing: self.provides_unfencing,
            timeouts: self
                .timeouts
                .iter()
                .filter(|(a, _)| a.targets_node())
                .map(|(a, d)| (*a, d.as_secs()))
                .collect(),
        }
    }
}

/// Actions assumed when `pcmk_supported_actions` is absent
pub fn default_supported_actions() -> BTreeSet<Action> {
    [
        Action::On,
        Action::Off,
        Action::Reboot,
        Action::Status,
        Action::Monitor,
        Action::List,
        Action::Metadata,
        Action::Validate,
    ]
    .into_iter()
    .collect()
}

/// A peer's view of one of its devices, carried in gossip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAdvert {
    pub id: String,
    pub host_check: HostCheck,
    #[serde(default)]
    pub host_list: BTreeSet<String>,
    /// Targets named in the host map (aliases stay local)
    #[serde(default)]
    pub host_map: BTreeSet<String>,
    /// Fresh result of the device's `list` action
    #[serde(default)]
    pub probed: Option<BTreeSet<String>>,
    pub actions: BTreeSet<Action>,
    #[serde(default)]
    pub provides_unfencing: bool,
    /// Per-action timeout in seconds
    #[serde(default)]
    pub timeouts: BTreeMap<Action, u64>,
}

impl DeviceAdvert {
    /// Same ranking rule as [`Device::can_target`], applied to a peer's device
    pub fn can_target(&self, target: &str) -> Option<MatchRank> {
        if self.host_check == HostCheck::None {
            return Some(MatchRank::Unrestricted);
        }
        if self.host_map.contains(target) {
            return Some(MatchRank::HostMap);
        }
        if self.host_list.contains(target) {
            return Some(MatchRank::HostList);
        }
        match (&self.host_check, &self.probed) {
            (HostCheck::DynamicList, Some(list)) if list.contains(target) => {
                Some(MatchRank::Probed)
            }
            _ => None,
        }
    }

    pub fn supports(&self, action: Action) -> bool {
        match action {
            Action::On => self.actions.contains(&Action::On) || self.provides_unfencing,
            Action::Confirm => false,
            other => self.actions.contains(&other),
        }
    }

    pub fn timeout_for(&self, action: Action, default: Duration) -> Duration {
        self.timeouts
            .get(&action)
            .map(|s| Duration::from_secs(*s))
            .unwrap_or(default)
    }
}

/// Parse `node1:1;node2:2,3` style host maps. `=` is accepted in place of
/// `:`, and entries may be separated by `;` or whitespace.
pub fn parse_host_map(raw: &str) -> Result<BTreeMap<String, String>, RegisterError> {
    let mut map = BTreeMap::new();
    for entry in raw.split(|c: char| c == ';' || c.is_whitespace()) {
        if entry.is_empty() {
            continue;
        }
        let Some((name, port)) = entry.split_once([':', '=']) else {
            return Err(RegisterError::BadParameters(format!(
                "{PARAM_HOST_MAP}: entry '{entry}' has no port"
            )));
        };
        if name.is_empty() || port.is_empty() {
            return Err(RegisterError::BadParameters(format!(
                "{PARAM_HOST_MAP}: malformed entry '{entry}'"
            )));
        }
        map.insert(name.to_string(), port.to_string());
    }
    Ok(map)
}

/// Split a host list or agent `list` output into target names
pub fn split_targets(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty() && !s.contains('='))
        .map(str::to_string)
        .collect()
}

/// Longest timeout accepted from a client, a peer or a device parameter
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Accepts humantime (`90s`, `2min`) or a bare number of seconds, up to
/// [`MAX_TIMEOUT`]
pub fn parse_timeout(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let timeout = match raw.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(raw).ok()?,
    };
    (timeout <= MAX_TIMEOUT).then_some(timeout)
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
