// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fence-admin - administration client for the fencing daemon

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod error;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgGroup, Parser};

use crate::client::{resolve_socket, DaemonClient};
use crate::commands::{Command, Options};
use crate::error::AdminError;
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "fence-admin",
    version,
    about = "Register fencing devices, query them and fence cluster nodes"
)]
#[command(group(ArgGroup::new("command").required(true).multiple(false)))]
pub struct Cli {
    /// List devices that can terminate the specified host
    #[arg(short = 'l', long, value_name = "HOST", group = "command")]
    list: Option<String>,

    /// List all registered devices
    #[arg(short = 'L', long, group = "command")]
    list_registered: bool,

    /// List all installed fence agents
    #[arg(short = 'I', long, group = "command")]
    list_installed: bool,

    /// Show agent metadata. Requires --agent
    #[arg(short = 'M', long, group = "command", requires = "agent")]
    metadata: bool,

    /// Check the named device's status
    #[arg(short = 'Q', long, value_name = "DEVICE", group = "command")]
    query: Option<String>,

    /// Fence (power off) the named host
    #[arg(short = 'F', long, value_name = "HOST", group = "command")]
    fence: Option<String>,

    /// Reboot the named host
    #[arg(short = 'B', long, value_name = "HOST", group = "command")]
    reboot: Option<String>,

    /// Unfence (power on) the named host
    #[arg(short = 'U', long, value_name = "HOST", group = "command")]
    unfence: Option<String>,

    /// Tell the cluster the named host is safely down
    #[arg(short = 'C', long, value_name = "HOST", group = "command")]
    confirm: Option<String>,

    /// Show fencing history of the named host ('*' for all hosts)
    #[arg(short = 'H', long, value_name = "HOST", group = "command")]
    history: Option<String>,

    /// Register the named device. Requires --agent
    #[arg(short = 'R', long, value_name = "DEVICE", group = "command", requires = "agent")]
    register: Option<String>,

    /// Deregister the named device
    #[arg(short = 'D', long, value_name = "DEVICE", group = "command")]
    deregister: Option<String>,

    /// Register a level for NAME, #NODE-ID, ATTR=VALUE or @PATTERN.
    /// Requires --index and --device
    #[arg(
        short = 'r',
        long,
        value_name = "TARGET",
        group = "command",
        requires_all = ["index", "device"]
    )]
    register_level: Option<String>,

    /// Deregister a level. Requires --index
    #[arg(
        short = 'd',
        long,
        value_name = "TARGET",
        group = "command",
        requires = "index"
    )]
    deregister_level: Option<String>,

    /// Show daemon status
    #[arg(long, group = "command")]
    status: bool,

    /// Cancel a pending operation
    #[arg(long, value_name = "OP_ID", group = "command")]
    cancel: Option<String>,

    /// Stop the daemon
    #[arg(long, group = "command")]
    shutdown: bool,

    /// Fence agent
    #[arg(short = 'a', long)]
    agent: Option<String>,

    /// Device parameter (repeatable)
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    options: Vec<(String, String)>,

    /// Device of a level (repeatable, in order)
    #[arg(long, value_name = "DEVICE")]
    device: Vec<String>,

    /// Level index (1-9)
    #[arg(short = 'i', long, value_parser = clap::value_parser!(u8).range(1..=9))]
    index: Option<u8>,

    /// Registered device provides unfencing
    #[arg(long)]
    unfencing: bool,

    /// Operation budget in seconds
    #[arg(short = 't', long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Succeed without acting when the host was fenced this recently (seconds)
    #[arg(long, value_name = "SECONDS")]
    tolerance: Option<u64>,

    /// Allow a node to fence itself
    #[arg(long)]
    allow_self_fencing: bool,

    /// Return as soon as the daemon accepted the request
    #[arg(long = "async")]
    detach: bool,

    /// Name recorded as the origin of the request
    #[arg(long)]
    client_id: Option<String>,

    /// Daemon socket
    #[arg(long, env = "FENCED_SOCKET_PATH")]
    socket: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Print nothing; report through the exit code only
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Print more detail and debug logs
    #[arg(short, long)]
    verbose: bool,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

impl Cli {
    /// The single command the flags select
    fn selected(&self) -> Option<Command> {
        use fenced_core::Action;

        let fence = |target: &String, action: Action| Command::Fence {
            target: target.clone(),
            action,
        };
        if let Some(host) = &self.list {
            return Some(Command::List { host: host.clone() });
        }
        if self.list_registered {
            return Some(Command::ListRegistered);
        }
        if self.list_installed {
            return Some(Command::ListInstalled);
        }
        if self.metadata {
            return self
                .agent
                .clone()
                .map(|agent| Command::Metadata { agent });
        }
        if let Some(device) = &self.query {
            return Some(Command::DeviceStatus {
                device: device.clone(),
            });
        }
        if let Some(host) = &self.fence {
            return Some(fence(host, Action::Off));
        }
        if let Some(host) = &self.reboot {
            return Some(fence(host, Action::Reboot));
        }
        if let Some(host) = &self.unfence {
            return Some(fence(host, Action::On));
        }
        if let Some(host) = &self.confirm {
            return Some(fence(host, Action::Confirm));
        }
        if let Some(host) = &self.history {
            let target = (host != "*").then(|| host.clone());
            return Some(Command::History { target });
        }
        if let Some(device) = &self.register {
            return self.agent.clone().map(|agent| Command::Register {
                device: device.clone(),
                agent,
                params: self.options.iter().cloned().collect(),
                unfencing: self.unfencing,
            });
        }
        if let Some(device) = &self.deregister {
            return Some(Command::Deregister {
                device: device.clone(),
            });
        }
        if let Some(target) = &self.register_level {
            return self.index.map(|index| Command::RegisterLevel {
                target: target.clone(),
                index,
                devices: self.device.clone(),
            });
        }
        if let Some(target) = &self.deregister_level {
            return self.index.map(|index| Command::DeregisterLevel {
                target: target.clone(),
                index,
            });
        }
        if self.status {
            return Some(Command::Status);
        }
        if let Some(op_id) = &self.cancel {
            return Some(Command::Cancel {
                op_id: op_id.clone(),
            });
        }
        if self.shutdown {
            return Some(Command::Shutdown);
        }
        None
    }

    fn options(&self) -> Options {
        Options {
            format: self.output,
            quiet: self.quiet,
            verbose: self.verbose,
            timeout: self.timeout.map(Duration::from_secs),
            tolerance: self.tolerance.map(Duration::from_secs),
            allow_self_fencing: self.allow_self_fencing,
            detach: self.detach,
            client_id: self.client_id.clone(),
        }
    }
}

fn setup_logging(quiet: bool, verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    let command = cli
        .selected()
        .ok_or_else(|| AdminError::new("missing arguments for the selected command"))?;
    let options = cli.options();

    let socket = resolve_socket(cli.socket.clone()).ok_or_else(|| {
        AdminError::new("could not determine the daemon socket")
            .with_suggestion("Pass --socket <PATH> or set FENCED_SOCKET_PATH")
    })?;
    tracing::debug!(socket = %socket.display(), ?command, "connecting");
    let client = DaemonClient::connect(socket).map_err(AdminError::from_client)?;

    commands::run(&client, command, &options).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.quiet, cli.verbose);
    let quiet = cli.quiet;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let admin = match err.downcast::<AdminError>() {
                Ok(admin) => admin,
                Err(other) => match other.downcast::<client::ClientError>() {
                    Ok(client_err) => AdminError::from_client(client_err),
                    Err(other) => AdminError::new(format!("{other:#}")),
                },
            };
            if !quiet {
                eprint!("{}", admin);
            }
            ExitCode::from(admin.exit_code())
        }
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
