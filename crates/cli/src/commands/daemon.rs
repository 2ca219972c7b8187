// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon status and shutdown

use anyhow::Result;
use fenced_daemon::PROTOCOL_VERSION;

use super::Options;
use crate::client::DaemonClient;
use crate::error::AdminError;
use crate::output::{self, StatusView};

pub async fn status(client: &DaemonClient, options: &Options) -> Result<()> {
    let version = client.hello().await?;
    if version != PROTOCOL_VERSION {
        return Err(AdminError::new(format!(
            "daemon speaks protocol {version}, this client speaks {PROTOCOL_VERSION}"
        ))
        .with_suggestion("Restart fenced after upgrading")
        .into());
    }
    let status = client.status().await?;
    if !options.quiet {
        output::print(&StatusView(status), options.format);
    }
    Ok(())
}

pub async fn shutdown(client: &DaemonClient, options: &Options) -> Result<()> {
    client.shutdown().await?;
    if options.verbose {
        options.say(format!(
            "Asked fenced at {} to stop",
            client.socket_path().display()
        ));
    } else {
        options.say("fenced stopping");
    }
    Ok(())
}
