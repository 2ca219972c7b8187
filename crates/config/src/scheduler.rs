// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deciding which fencing devices the local peer hosts
//!
//! One pass walks the resource tree once. Collective resources are expanded
//! into their members; for a clone only the first member is looked at since
//! every instance is the same device.

use crate::model::{ClusterModel, ResourceIdx, ResourceKind, Score, WatchdogSetting};
use fenced_core::{DeviceSpec, HostInfo, TopologyLevel, WATCHDOG_DEVICE};
use std::time::Duration;
use thiserror::Error;

/// Resource class of fencing devices
pub const STONITH_CLASS: &str = "stonith";

/// Why a resource was not turned into a device
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("{0} is not a fencing resource")]
    NotStonith(String),
    #[error("fencing device {0} is disabled")]
    Disabled(String),
    #[error("fencing device {0} skipped because watchdog fencing is disabled")]
    WatchdogDisabled(String),
    #[error("local node is not allowed to run fencing device {0}")]
    NotAllowed(String),
    #[error("local node has preference {score} for fencing device {id}")]
    NegativeScore { id: String, score: String },
    #[error("local node has preference {score} for the group of fencing device {id}")]
    GroupNegativeScore { id: String, score: String },
    #[error("fencing device {0} has no agent")]
    MissingAgent(String),
}

/// Result of one evaluation of the configuration
#[derive(Debug, Clone, Default)]
pub struct SchedulerPass {
    pub devices: Vec<Result<DeviceSpec, FilterError>>,
    pub levels: Vec<TopologyLevel>,
    pub hosts: Vec<HostInfo>,
    /// Resolved watchdog timeout; zero disables watchdog fencing
    pub watchdog_timeout: Duration,
    pub stonith_timeout: Option<Duration>,
}

impl SchedulerPass {
    /// The devices that survived filtering
    pub fn accepted(&self) -> impl Iterator<Item = &DeviceSpec> {
        self.devices.iter().filter_map(|d| d.as_ref().ok())
    }
}

/// Turns a configuration into the devices and levels the local peer hosts
pub trait SchedulerEvaluator {
    fn evaluate(&self, model: &ClusterModel) -> SchedulerPass;
}

/// Location-only evaluation for one node
#[derive(Debug, Clone)]
pub struct ConfigEvaluator {
    local: String,
    /// Local `SBD_WATCHDOG_TIMEOUT`, used when the cluster asks for auto
    sbd_watchdog_timeout: Option<Duration>,
}

impl ConfigEvaluator {
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            sbd_watchdog_timeout: None,
        }
    }

    pub fn with_sbd_watchdog_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.sbd_watchdog_timeout = timeout;
        self
    }

    /// Read `SBD_WATCHDOG_TIMEOUT` (seconds) from the environment
    pub fn sbd_timeout_from_env() -> Option<Duration> {
        std::env::var("SBD_WATCHDOG_TIMEOUT")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn watchdog_timeout(&self, setting: WatchdogSetting) -> Duration {
        match setting {
            WatchdogSetting::Disabled => Duration::ZERO,
            WatchdogSetting::Fixed(timeout) => timeout,
            WatchdogSetting::Auto => self
                .sbd_watchdog_timeout
                .map(|t| t * 2)
                .unwrap_or(Duration::ZERO),
        }
    }

    fn visit(
        &self,
        model: &ClusterModel,
        idx: ResourceIdx,
        watchdog: Duration,
        out: &mut Vec<Result<DeviceSpec, FilterError>>,
    ) {
        let resource = model.get(idx);
        match &resource.kind {
            ResourceKind::Group { children } => {
                for child in children {
                    self.visit(model, *child, watchdog, out);
                }
            }
            ResourceKind::Clone { child } => self.visit(model, *child, watchdog, out),
            ResourceKind::Primitive { .. } => {
                let result = self.check(model, idx, watchdog);
                if let Err(reason) = &result {
                    tracing::info!(resource = %resource.id, %reason, "ignoring resource");
                }
                out.push(result);
            }
        }
    }

    fn check(
        &self,
        model: &ClusterModel,
        idx: ResourceIdx,
        watchdog: Duration,
    ) -> Result<DeviceSpec, FilterError> {
        let resource = model.get(idx);
        let ResourceKind::Primitive {
            class,
            agent,
            params,
        } = &resource.kind
        else {
            return Err(FilterError::NotStonith(resource.id.clone()));
        };
        let id = resource.id.clone();

        if !class.eq_ignore_ascii_case(STONITH_CLASS) {
            return Err(FilterError::NotStonith(id));
        }
        if model.is_disabled(idx) {
            return Err(FilterError::Disabled(id));
        }
        if watchdog.is_zero() && id == WATCHDOG_DEVICE {
            return Err(FilterError::WatchdogDisabled(id));
        }

        let node = model
            .node(&self.local)
            .ok_or_else(|| FilterError::NotAllowed(id.clone()))?;
        let score = model
            .preference(idx, node)
            .ok_or_else(|| FilterError::NotAllowed(id.clone()))?;
        if score.is_negative() {
            return Err(FilterError::NegativeScore {
                id,
                score: score.to_string(),
            });
        }

        if let Some(parent) = resource.parent.filter(|p| model.get(*p).is_group()) {
            let group_score = model.preference(parent, node).unwrap_or(Score::ZERO);
            if group_score.is_negative() {
                return Err(FilterError::GroupNegativeScore {
                    id,
                    score: group_score.to_string(),
                });
            }
        }

        let agent = agent
            .clone()
            .ok_or_else(|| FilterError::MissingAgent(id.clone()))?;
        let mut spec = DeviceSpec::new(id, agent);
        spec.params = params.clone();
        if resource
            .meta
            .get("provides")
            .is_some_and(|p| p.eq_ignore_ascii_case("unfencing"))
        {
            spec = spec.unfencing();
        }
        Ok(spec)
    }
}

impl SchedulerEvaluator for ConfigEvaluator {
    fn evaluate(&self, model: &ClusterModel) -> SchedulerPass {
        let watchdog_timeout = self.watchdog_timeout(model.watchdog);
        let mut devices = Vec::new();
        for root in model.roots() {
            self.visit(model, root, watchdog_timeout, &mut devices);
        }
        SchedulerPass {
            devices,
            levels: model.levels.clone(),
            hosts: model.hosts(),
            watchdog_timeout,
            stonith_timeout: model.stonith_timeout,
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
