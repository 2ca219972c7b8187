// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Topology level commands

use anyhow::Result;
use fenced_core::TargetSpec;

use super::Options;
use crate::client::DaemonClient;
use crate::error::AdminError;

fn parse_target(raw: &str) -> Result<TargetSpec, AdminError> {
    raw.parse::<TargetSpec>().map_err(|e| {
        AdminError::new(format!("invalid level target '{raw}': {}", e.reason()))
            .with_rc(e.rc())
            .with_suggestion("Use NAME, #NODE-ID, ATTR=VALUE or @PATTERN")
    })
}

pub async fn register(
    client: &DaemonClient,
    target: &str,
    index: u8,
    devices: Vec<String>,
    options: &Options,
) -> Result<()> {
    let spec = parse_target(target)?;
    let count = devices.len();
    client.register_level(spec.clone(), index, devices).await?;
    options.say(format!(
        "Registered level {index} for {spec} ({count} device{})",
        if count == 1 { "" } else { "s" }
    ));
    Ok(())
}

pub async fn deregister(
    client: &DaemonClient,
    target: &str,
    index: u8,
    options: &Options,
) -> Result<()> {
    let spec = parse_target(target)?;
    client.deregister_level(spec.clone(), index).await?;
    options.say(format!("Deregistered level {index} for {spec}"));
    Ok(())
}
