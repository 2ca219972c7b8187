// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster configuration document (TOML)
//!
//! ```toml
//! [options]
//! stonith-timeout = "60s"
//! stonith-watchdog-timeout = "0"
//!
//! [[node]]
//! name = "node1"
//! id = 1
//!
//! [[primitive]]
//! id = "fence-ipmi"
//! class = "stonith"
//! agent = "fence_ipmilan"
//! params = { pcmk_host_list = "node2", ip = "10.0.0.2" }
//!
//! [[location]]
//! resource = "fence-ipmi"
//! node = "node2"
//! score = "-INFINITY"
//!
//! [[level]]
//! target = "node2"
//! index = 1
//! devices = "fence-ipmi"
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur while parsing the document
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterDocument {
    #[serde(default)]
    pub options: OptionsDoc,
    #[serde(default, rename = "node")]
    pub nodes: Vec<NodeDoc>,
    #[serde(default, rename = "primitive")]
    pub primitives: Vec<PrimitiveDoc>,
    #[serde(default, rename = "group")]
    pub groups: Vec<GroupDoc>,
    #[serde(default, rename = "clone")]
    pub clones: Vec<CloneDoc>,
    #[serde(default, rename = "location")]
    pub locations: Vec<LocationDoc>,
    #[serde(default, rename = "level")]
    pub levels: Vec<LevelDoc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OptionsDoc {
    pub stonith_timeout: Option<String>,
    pub stonith_watchdog_timeout: Option<String>,
    #[serde(default = "default_symmetric")]
    pub symmetric_cluster: bool,
}

fn default_symmetric() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeDoc {
    pub name: String,
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrimitiveDoc {
    pub id: String,
    pub class: String,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupDoc {
    pub id: String,
    pub members: Vec<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloneDoc {
    pub id: String,
    /// Primitive or group being cloned
    pub member: String,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationDoc {
    pub resource: String,
    pub node: String,
    pub score: ScoreDoc,
}

/// Scores are integers or the strings `INFINITY`, `+INFINITY`, `-INFINITY`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScoreDoc {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LevelDoc {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub target_pattern: Option<String>,
    #[serde(default)]
    pub target_attribute: Option<String>,
    #[serde(default)]
    pub target_value: Option<String>,
    #[serde(default)]
    pub target_node_id: Option<u32>,
    pub index: u8,
    /// Comma separated device ids
    pub devices: String,
}

/// Parse a cluster configuration document from TOML content
pub fn parse_document(content: &str) -> Result<ClusterDocument, ParseError> {
    let doc: ClusterDocument = toml::from_str(content)?;
    for level in &doc.levels {
        let targets = [
            level.target.is_some(),
            level.target_pattern.is_some(),
            level.target_attribute.is_some(),
            level.target_node_id.is_some(),
        ];
        if targets.iter().filter(|set| **set).count() != 1 {
            return Err(ParseError::InvalidFormat(format!(
                "level {} must name exactly one of target, target-pattern, target-attribute, target-node-id",
                level.index
            )));
        }
        if level.target_attribute.is_some() != level.target_value.is_some() {
            return Err(ParseError::InvalidFormat(format!(
                "level {}: target-attribute needs target-value",
                level.index
            )));
        }
    }
    Ok(doc)
}

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;
