// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device and agent commands

use std::collections::BTreeMap;

use anyhow::Result;

use super::Options;
use crate::client::DaemonClient;
use crate::output::{self, CandidateRow, OutputFormat};

/// `--list HOST`: devices able to fence the host, best first
pub async fn list(client: &DaemonClient, host: &str, options: &Options) -> Result<()> {
    let rows: Vec<_> = client
        .query(host)
        .await?
        .into_iter()
        .map(CandidateRow)
        .collect();
    if options.quiet {
        return Ok(());
    }
    output::print_list(&rows, options.format, &format!("No devices can fence {host}"));
    Ok(())
}

pub async fn list_registered(client: &DaemonClient, options: &Options) -> Result<()> {
    let devices = client.list_registered().await?;
    if !options.quiet {
        output::print_list(&devices, options.format, "No devices registered");
    }
    Ok(())
}

pub async fn list_installed(client: &DaemonClient, options: &Options) -> Result<()> {
    let agents = client.list_installed(options.timeout).await?;
    if !options.quiet {
        output::print_list(&agents, options.format, "No fence agents installed");
    }
    Ok(())
}

pub async fn metadata(client: &DaemonClient, agent: &str, options: &Options) -> Result<()> {
    let metadata = client.metadata(agent, options.timeout).await?;
    if options.quiet {
        return Ok(());
    }
    match options.format {
        OutputFormat::Text => print!("{}", metadata),
        OutputFormat::Json => output::print(
            &serde_json::json!({ "agent": agent, "metadata": metadata }),
            options.format,
        ),
    }
    Ok(())
}

/// `--query DEVICE`: run the device's monitor action
pub async fn status(client: &DaemonClient, device: &str, options: &Options) -> Result<()> {
    client.device_status(device, options.timeout).await?;
    options.say(format!("{device}: OK"));
    Ok(())
}

pub async fn register(
    client: &DaemonClient,
    device: &str,
    agent: &str,
    params: BTreeMap<String, String>,
    unfencing: bool,
    options: &Options,
) -> Result<()> {
    tracing::debug!(device, agent, params = params.len(), "registering device");
    let replaced = client
        .register_device(device, agent, params, unfencing)
        .await?;
    if replaced {
        options.say(format!("Replaced device {device} ({agent})"));
    } else {
        options.say(format!("Registered device {device} ({agent})"));
    }
    Ok(())
}

pub async fn deregister(client: &DaemonClient, device: &str, options: &Options) -> Result<()> {
    client.deregister_device(device).await?;
    options.say(format!("Deregistered device {device}"));
    Ok(())
}
