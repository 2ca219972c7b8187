// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fencing history command

use anyhow::Result;

use super::Options;
use crate::client::DaemonClient;
use crate::output::{self, HistoryRow};

/// `--history HOST`, or every host for `*`
pub async fn show(client: &DaemonClient, target: Option<&str>, options: &Options) -> Result<()> {
    let mut records = client.history(target).await?;
    records.sort_by_key(|r| r.timestamp());
    if options.quiet {
        return Ok(());
    }
    let rows: Vec<_> = records.into_iter().map(HistoryRow).collect();
    let empty = match target {
        Some(host) => format!("No fencing history for {host}"),
        None => "No fencing history".to_string(),
    };
    output::print_list(&rows, options.format, &empty);
    Ok(())
}
