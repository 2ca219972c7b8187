// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Arena model of the cluster configuration
//!
//! Nodes and resources live in flat vectors and refer to each other by
//! index. Resources form a tree (clone > group > primitive), so parent and
//! child links never cycle.

use crate::document::{ClusterDocument, LevelDoc, ParseError, ScoreDoc};
use fenced_core::{HostInfo, TargetSpec, TopologyLevel, TopologyTable};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("duplicate id: {0}")]
    Duplicate(String),
    #[error("{parent} refers to unknown resource {child}")]
    UnknownMember { parent: String, child: String },
    #[error("resource {0} has more than one parent")]
    MultipleParents(String),
    #[error("group {group} may only contain primitives, found {child}")]
    NestedGroup { group: String, child: String },
    #[error("clone {0} may not contain another clone")]
    NestedClone(String),
    #[error("location constraint refers to unknown {kind} {id}")]
    UnknownReference { kind: &'static str, id: String },
    #[error("invalid score: {0}")]
    InvalidScore(String),
    #[error("invalid option {name}: {value}")]
    InvalidOption { name: &'static str, value: String },
}

/// Placement preference, saturating at +/- infinity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Score(i64);

impl Score {
    pub const INFINITY: i64 = 1_000_000;
    pub const ZERO: Score = Score(0);

    pub fn new(value: i64) -> Self {
        Score(value.clamp(-Self::INFINITY, Self::INFINITY))
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn add(self, other: Score) -> Score {
        // -INFINITY dominates
        if self.0 == -Self::INFINITY || other.0 == -Self::INFINITY {
            return Score(-Self::INFINITY);
        }
        Score::new(self.0.saturating_add(other.0))
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    fn parse(doc: &ScoreDoc) -> Result<Score, ModelError> {
        match doc {
            ScoreDoc::Int(v) => Ok(Score::new(*v)),
            ScoreDoc::Text(text) => match text.trim() {
                "INFINITY" | "+INFINITY" => Ok(Score(Self::INFINITY)),
                "-INFINITY" => Ok(Score(-Self::INFINITY)),
                other => other
                    .parse::<i64>()
                    .map(Score::new)
                    .map_err(|_| ModelError::InvalidScore(text.clone())),
            },
        }
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            v if v >= Self::INFINITY => write!(f, "INFINITY"),
            v if v <= -Self::INFINITY => write!(f, "-INFINITY"),
            v => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdx(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdx(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceKind {
    Primitive {
        class: String,
        agent: Option<String>,
        params: BTreeMap<String, String>,
    },
    Group {
        children: Vec<ResourceIdx>,
    },
    Clone {
        child: ResourceIdx,
    },
}

#[derive(Debug, Clone)]
pub struct Resource {
    pub id: String,
    pub kind: ResourceKind,
    pub meta: BTreeMap<String, String>,
    pub parent: Option<ResourceIdx>,
    /// Scores from location constraints naming this resource directly
    pub constraints: HashMap<NodeIdx, Score>,
}

impl Resource {
    fn new(id: String, kind: ResourceKind, meta: BTreeMap<String, String>) -> Self {
        Self {
            id,
            kind,
            meta,
            parent: None,
            constraints: HashMap::new(),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, ResourceKind::Group { .. })
    }

    /// Disabled through its own meta attributes
    fn disabled_here(&self) -> bool {
        let role = self.meta.get("target-role").map(|s| s.to_ascii_lowercase());
        let disabled = self.meta.get("disabled").map(|s| s.to_ascii_lowercase());
        role.as_deref() == Some("stopped") || matches!(disabled.as_deref(), Some("true" | "1" | "yes"))
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub host: HostInfo,
}

/// Watchdog timeout setting before the auto value is resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogSetting {
    Disabled,
    /// Twice the local SBD watchdog timeout
    Auto,
    Fixed(Duration),
}

#[derive(Debug, Clone)]
pub struct ClusterModel {
    pub nodes: Vec<Node>,
    pub resources: Vec<Resource>,
    pub levels: Vec<TopologyLevel>,
    pub stonith_timeout: Option<Duration>,
    pub watchdog: WatchdogSetting,
    pub symmetric: bool,
}

impl ClusterModel {
    pub fn build(doc: ClusterDocument) -> Result<ClusterModel, ModelError> {
        let mut nodes: Vec<Node> = Vec::new();
        let mut node_index: HashMap<String, NodeIdx> = HashMap::new();
        for node in doc.nodes {
            if node_index.contains_key(&node.name) {
                return Err(ModelError::Duplicate(node.name));
            }
            node_index.insert(node.name.clone(), NodeIdx(nodes.len()));
            nodes.push(Node {
                host: HostInfo {
                    name: node.name,
                    node_id: node.id,
                    attributes: node.attributes,
                },
            });
        }

        let mut resources: Vec<Resource> = Vec::new();
        let mut index: HashMap<String, ResourceIdx> = HashMap::new();

        for p in doc.primitives {
            insert(
                &mut resources,
                &mut index,
                Resource::new(
                    p.id,
                    ResourceKind::Primitive {
                        class: p.class,
                        agent: p.agent,
                        params: p.params,
                    },
                    p.meta,
                ),
            )?;
        }

        for g in doc.groups {
            let mut children = Vec::new();
            for member in &g.members {
                let child = lookup(&index, &g.id, member)?;
                if !matches!(resources[child.0].kind, ResourceKind::Primitive { .. }) {
                    return Err(ModelError::NestedGroup {
                        group: g.id.clone(),
                        child: member.clone(),
                    });
                }
                children.push(child);
            }
            let group = insert(
                &mut resources,
                &mut index,
                Resource::new(g.id, ResourceKind::Group { children: children.clone() }, g.meta),
            )?;
            for child in children {
                set_parent(&mut resources, child, group)?;
            }
        }

        // Members of a clone are primitives or groups, all known by now
        for c in doc.clones {
            let child = lookup(&index, &c.id, &c.member)?;
            if matches!(resources[child.0].kind, ResourceKind::Clone { .. }) {
                return Err(ModelError::NestedClone(c.id));
            }
            let clone = insert(
                &mut resources,
                &mut index,
                Resource::new(c.id, ResourceKind::Clone { child }, c.meta),
            )?;
            set_parent(&mut resources, child, clone)?;
        }

        for loc in doc.locations {
            let resource = index
                .get(&loc.resource)
                .copied()
                .ok_or(ModelError::UnknownReference {
                    kind: "resource",
                    id: loc.resource.clone(),
                })?;
            let node = node_index
                .get(&loc.node)
                .copied()
                .ok_or(ModelError::UnknownReference {
                    kind: "node",
                    id: loc.node.clone(),
                })?;
            let score = Score::parse(&loc.score)?;
            let entry = resources[resource.0]
                .constraints
                .entry(node)
                .or_insert(Score::ZERO);
            *entry = entry.add(score);
        }

        let stonith_timeout = match doc.options.stonith_timeout {
            None => None,
            Some(raw) => Some(parse_duration(&raw).ok_or(ModelError::InvalidOption {
                name: "stonith-timeout",
                value: raw,
            })?),
        };
        let watchdog = match doc.options.stonith_watchdog_timeout {
            None => WatchdogSetting::Disabled,
            Some(raw) => parse_watchdog(&raw).ok_or(ModelError::InvalidOption {
                name: "stonith-watchdog-timeout",
                value: raw,
            })?,
        };

        let levels = doc.levels.into_iter().filter_map(level_from_doc).collect();

        Ok(ClusterModel {
            nodes,
            resources,
            levels,
            stonith_timeout,
            watchdog,
            symmetric: doc.options.symmetric_cluster,
        })
    }

    pub fn node(&self, name: &str) -> Option<NodeIdx> {
        self.nodes
            .iter()
            .position(|n| n.host.name.eq_ignore_ascii_case(name))
            .map(NodeIdx)
    }

    pub fn resource(&self, id: &str) -> Option<ResourceIdx> {
        self.resources
            .iter()
            .position(|r| r.id == id)
            .map(ResourceIdx)
    }

    pub fn get(&self, idx: ResourceIdx) -> &Resource {
        &self.resources[idx.0]
    }

    pub fn hosts(&self) -> Vec<HostInfo> {
        self.nodes.iter().map(|n| n.host.clone()).collect()
    }

    /// Top-level resources, those without a parent
    pub fn roots(&self) -> impl Iterator<Item = ResourceIdx> + '_ {
        self.resources
            .iter()
            .enumerate()
            .filter(|(_, r)| r.parent.is_none())
            .map(|(i, _)| ResourceIdx(i))
    }

    pub fn ancestors(&self, idx: ResourceIdx) -> Vec<ResourceIdx> {
        let mut out = Vec::new();
        let mut cur = self.get(idx).parent;
        while let Some(p) = cur {
            out.push(p);
            cur = self.get(p).parent;
        }
        out
    }

    /// Disabled itself or through any ancestor
    pub fn is_disabled(&self, idx: ResourceIdx) -> bool {
        self.get(idx).disabled_here() || self.ancestors(idx).iter().any(|a| self.get(*a).disabled_here())
    }

    /// Preference of `node` for the resource: `None` when the node is not in
    /// the resource's allowed set. Constraints on ancestors apply too.
    pub fn preference(&self, idx: ResourceIdx, node: NodeIdx) -> Option<Score> {
        let mut chain = vec![idx];
        chain.extend(self.ancestors(idx));
        let mut constrained = false;
        let mut score = Score::ZERO;
        for r in chain {
            if let Some(s) = self.get(r).constraints.get(&node) {
                constrained = true;
                score = score.add(*s);
            }
        }
        (self.symmetric || constrained).then_some(score)
    }

    /// The levels as a topology table; invalid levels are skipped with a log
    pub fn topology(&self) -> TopologyTable {
        let mut table = TopologyTable::new();
        for level in &self.levels {
            if let Err(e) = table.set_level(level.target.clone(), level.index, level.devices.clone()) {
                tracing::warn!(host = %level.target, index = level.index, error = %e, "ignoring fencing level");
            }
        }
        table
    }
}

fn set_parent(
    resources: &mut [Resource],
    child: ResourceIdx,
    parent: ResourceIdx,
) -> Result<(), ModelError> {
    let entry = &mut resources[child.0];
    if entry.parent.is_some() {
        return Err(ModelError::MultipleParents(entry.id.clone()));
    }
    entry.parent = Some(parent);
    Ok(())
}

fn insert(
    resources: &mut Vec<Resource>,
    index: &mut HashMap<String, ResourceIdx>,
    resource: Resource,
) -> Result<ResourceIdx, ModelError> {
    if index.contains_key(&resource.id) {
        return Err(ModelError::Duplicate(resource.id));
    }
    let idx = ResourceIdx(resources.len());
    index.insert(resource.id.clone(), idx);
    resources.push(resource);
    Ok(idx)
}

fn lookup(
    index: &HashMap<String, ResourceIdx>,
    parent: &str,
    child: &str,
) -> Result<ResourceIdx, ModelError> {
    index
        .get(child)
        .copied()
        .ok_or_else(|| ModelError::UnknownMember {
            parent: parent.to_string(),
            child: child.to_string(),
        })
}

fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).ok()
}

fn parse_watchdog(raw: &str) -> Option<WatchdogSetting> {
    let raw = raw.trim();
    if raw.starts_with('-') {
        return Some(WatchdogSetting::Auto);
    }
    let duration = parse_duration(raw)?;
    Some(if duration.is_zero() {
        WatchdogSetting::Disabled
    } else {
        WatchdogSetting::Fixed(duration)
    })
}

fn level_from_doc(doc: LevelDoc) -> Option<TopologyLevel> {
    let target = if let Some(name) = doc.target {
        TargetSpec::name(name)
    } else if let Some(pattern) = doc.target_pattern {
        TargetSpec::pattern(pattern)
    } else if let (Some(name), Some(value)) = (doc.target_attribute, doc.target_value) {
        TargetSpec::attribute(name, value)
    } else {
        TargetSpec::NodeId {
            id: doc.target_node_id?,
        }
    };
    let devices: Vec<String> = doc
        .devices
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from)
        .collect();
    Some(TopologyLevel {
        target,
        index: doc.index,
        devices,
    })
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
