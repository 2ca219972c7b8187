// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Cluster configuration for the fencer
//!
//! The cluster configuration is a TOML document listing cluster options,
//! nodes, resources, location constraints and fencing levels. It is parsed
//! into a [`ClusterModel`] and evaluated for the local node to decide which
//! fencing devices this peer should host.

mod document;
mod model;
mod scheduler;

pub use document::{parse_document, ClusterDocument, ParseError};
pub use model::{
    ClusterModel, ModelError, Node, NodeIdx, Resource, ResourceIdx, ResourceKind, Score,
    WatchdogSetting,
};
pub use scheduler::{
    ConfigEvaluator, FilterError, SchedulerEvaluator, SchedulerPass, STONITH_CLASS,
};

/// Parse and build the model in one step
pub fn load_model(content: &str) -> Result<ClusterModel, ModelError> {
    let doc = parse_document(content)?;
    ClusterModel::build(doc)
}
