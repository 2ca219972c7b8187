// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod daemon;
pub mod device;
pub mod fence;
pub mod history;
pub mod level;

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use fenced_core::Action;

use crate::client::DaemonClient;
use crate::output::OutputFormat;

/// The one thing a `fence-admin` invocation does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List {
        host: String,
    },
    ListRegistered,
    ListInstalled,
    Metadata {
        agent: String,
    },
    DeviceStatus {
        device: String,
    },
    Fence {
        target: String,
        action: Action,
    },
    History {
        target: Option<String>,
    },
    Register {
        device: String,
        agent: String,
        params: BTreeMap<String, String>,
        unfencing: bool,
    },
    Deregister {
        device: String,
    },
    RegisterLevel {
        target: String,
        index: u8,
        devices: Vec<String>,
    },
    DeregisterLevel {
        target: String,
        index: u8,
    },
    Status,
    Cancel {
        op_id: String,
    },
    Shutdown,
}

/// Modifiers shared by every command
#[derive(Debug, Clone)]
pub struct Options {
    pub format: OutputFormat,
    pub quiet: bool,
    pub verbose: bool,
    pub timeout: Option<Duration>,
    pub tolerance: Option<Duration>,
    pub allow_self_fencing: bool,
    pub detach: bool,
    pub client_id: Option<String>,
}

impl Options {
    /// Print a one-line confirmation unless quiet
    pub fn say(&self, message: impl std::fmt::Display) {
        if !self.quiet {
            println!("{}", message);
        }
    }
}

pub async fn run(client: &DaemonClient, command: Command, options: &Options) -> Result<()> {
    match command {
        Command::List { host } => device::list(client, &host, options).await,
        Command::ListRegistered => device::list_registered(client, options).await,
        Command::ListInstalled => device::list_installed(client, options).await,
        Command::Metadata { agent } => device::metadata(client, &agent, options).await,
        Command::DeviceStatus { device } => device::status(client, &device, options).await,
        Command::Register {
            device,
            agent,
            params,
            unfencing,
        } => device::register(client, &device, &agent, params, unfencing, options).await,
        Command::Deregister { device } => device::deregister(client, &device, options).await,
        Command::RegisterLevel {
            target,
            index,
            devices,
        } => level::register(client, &target, index, devices, options).await,
        Command::DeregisterLevel { target, index } => {
            level::deregister(client, &target, index, options).await
        }
        Command::Fence { target, action } => fence::fence(client, target, action, options).await,
        Command::Cancel { op_id } => fence::cancel(client, &op_id, options).await,
        Command::History { target } => history::show(client, target.as_deref(), options).await,
        Command::Status => daemon::status(client, options).await,
        Command::Shutdown => daemon::shutdown(client, options).await,
    }
}
