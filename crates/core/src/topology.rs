// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fencing topology: per-target ordered levels of devices

use crate::error::FenceError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Highest level index a target may use
pub const MAX_LEVEL: u8 = 9;

/// What a topology entry applies to
///
/// The variant order is the tier priority used by [`TopologyTable::levels_for`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetSpec {
    Name { name: String },
    NodeId { id: u32 },
    Attribute { name: String, value: String },
    Pattern { pattern: String },
}

impl TargetSpec {
    pub fn name(name: impl Into<String>) -> Self {
        TargetSpec::Name { name: name.into() }
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        TargetSpec::Pattern {
            pattern: pattern.into(),
        }
    }

    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        TargetSpec::Attribute {
            name: name.into(),
            value: value.into(),
        }
    }

    fn tier(&self) -> u8 {
        match self {
            TargetSpec::Name { .. } => 0,
            TargetSpec::NodeId { .. } => 1,
            TargetSpec::Attribute { .. } => 2,
            TargetSpec::Pattern { .. } => 3,
        }
    }
}

/// Textual form: `node`, `#<node-id>`, `attr=value`, `@regex`
impl FromStr for TargetSpec {
    type Err = FenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(FenceError::BadRequest("empty topology target".into()));
        }
        if let Some(pattern) = s.strip_prefix('@') {
            Regex::new(pattern)
                .map_err(|e| FenceError::BadRequest(format!("invalid target pattern: {e}")))?;
            return Ok(TargetSpec::pattern(pattern));
        }
        if let Some(id) = s.strip_prefix('#') {
            let id = id
                .parse()
                .map_err(|_| FenceError::BadRequest(format!("invalid node id '{id}'")))?;
            return Ok(TargetSpec::NodeId { id });
        }
        if let Some((name, value)) = s.split_once('=') {
            return Ok(TargetSpec::attribute(name, value));
        }
        Ok(TargetSpec::name(s))
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSpec::Name { name } => write!(f, "{name}"),
            TargetSpec::NodeId { id } => write!(f, "#{id}"),
            TargetSpec::Attribute { name, value } => write!(f, "{name}={value}"),
            TargetSpec::Pattern { pattern } => write!(f, "@{pattern}"),
        }
    }
}

/// What the topology needs to know about a host to match it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostInfo {
    pub name: String,
    pub node_id: Option<u32>,
    pub attributes: BTreeMap<String, String>,
}

impl HostInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyLevel {
    pub target: TargetSpec,
    pub index: u8,
    pub devices: Vec<String>,
}

#[derive(Debug, Default)]
pub struct TopologyTable {
    levels: BTreeMap<TargetSpec, BTreeMap<u8, Vec<String>>>,
    patterns: HashMap<String, Regex>,
}

impl TopologyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the level `(target, index)`. An empty device list with index 0
    /// removes every level of the target.
    pub fn set_level(
        &mut self,
        target: TargetSpec,
        index: u8,
        devices: Vec<String>,
    ) -> Result<(), FenceError> {
        if index == 0 && devices.is_empty() {
            self.remove_target(&target);
            return Ok(());
        }
        if !(1..=MAX_LEVEL).contains(&index) {
            return Err(FenceError::BadRequest(format!(
                "level index {index} outside 1..{MAX_LEVEL}"
            )));
        }
        if devices.is_empty() {
            return Err(FenceError::BadRequest(format!(
                "level {index} for {target} has no devices"
            )));
        }
        if let TargetSpec::Pattern { pattern } = &target {
            if !self.patterns.contains_key(pattern) {
                let re = Regex::new(pattern)
                    .map_err(|e| FenceError::BadRequest(format!("invalid target pattern: {e}")))?;
                self.patterns.insert(pattern.clone(), re);
            }
        }
        self.levels.entry(target).or_default().insert(index, devices);
        Ok(())
    }

    /// Remove one level; index 0 removes them all. Returns whether anything
    /// was removed.
    pub fn remove_level(&mut self, target: &TargetSpec, index: u8) -> bool {
        if index == 0 {
            return self.remove_target(target);
        }
        let Some(by_index) = self.levels.get_mut(target) else {
            return false;
        };
        let removed = by_index.remove(&index).is_some();
        if by_index.is_empty() {
            self.remove_target(target);
        }
        removed
    }

    fn remove_target(&mut self, target: &TargetSpec) -> bool {
        let removed = self.levels.remove(target).is_some();
        if let TargetSpec::Pattern { pattern } = target {
            self.patterns.remove(pattern);
        }
        removed
    }

    fn matches(&self, spec: &TargetSpec, host: &HostInfo) -> bool {
        match spec {
            TargetSpec::Name { name } => name == &host.name,
            TargetSpec::NodeId { id } => host.node_id == Some(*id),
            TargetSpec::Attribute { name, value } => host.attributes.get(name) == Some(value),
            TargetSpec::Pattern { pattern } => self
                .patterns
                .get(pattern)
                .is_some_and(|re| re.is_match(&host.name)),
        }
    }

    /// Levels that apply to `host`: exact name, then node id, then attribute,
    /// then pattern matches; ascending index within each tier.
    pub fn levels_for(&self, host: &HostInfo) -> Vec<TopologyLevel> {
        let mut found: Vec<(u8, u8, TopologyLevel)> = Vec::new();
        for (spec, by_index) in &self.levels {
            if !self.matches(spec, host) {
                continue;
            }
            for (index, devices) in by_index {
                found.push((
                    spec.tier(),
                    *index,
                    TopologyLevel {
                        target: spec.clone(),
                        index: *index,
                        devices: devices.clone(),
                    },
                ));
            }
        }
        // stable: duplicate indices within a tier keep table order
        found.sort_by_key(|(tier, index, _)| (*tier, *index));
        found.into_iter().map(|(_, _, level)| level).collect()
    }

    pub fn has_levels(&self, host: &HostInfo) -> bool {
        self.levels.keys().any(|spec| self.matches(spec, host))
    }

    /// Every level in the table
    pub fn all(&self) -> Vec<TopologyLevel> {
        self.levels
            .iter()
            .flat_map(|(spec, by_index)| {
                by_index.iter().map(move |(index, devices)| TopologyLevel {
                    target: spec.clone(),
                    index: *index,
                    devices: devices.clone(),
                })
            })
            .collect()
    }

    /// Replace the whole table
    pub fn replace_all(&mut self, levels: Vec<TopologyLevel>) -> Result<(), FenceError> {
        let mut next = TopologyTable::new();
        for level in levels {
            next.set_level(level.target, level.index, level.devices)?;
        }
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
#[path = "topology_tests.rs"]
mod tests;
