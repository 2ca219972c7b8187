// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatting for CLI commands

use std::fmt;

use clap::ValueEnum;
use fenced_core::{HistoryRecord, HistoryState};
use fenced_daemon::protocol::{CandidateSummary, DaemonStatus};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Print output in the specified format
pub fn print<T: Serialize + fmt::Display>(value: &T, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", value),
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(value) {
                println!("{}", json);
            }
        }
    }
}

/// Print a list of items, with `empty` as the text when there are none
pub fn print_list<T: Serialize + fmt::Display>(items: &[T], format: OutputFormat, empty: &str) {
    match format {
        OutputFormat::Text => {
            if items.is_empty() {
                println!("{}", empty);
            }
            for item in items {
                println!("{}", item);
            }
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(items) {
                println!("{}", json);
            }
        }
    }
}

/// A device able to fence a host
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct CandidateRow(pub CandidateSummary);

impl fmt::Display for CandidateRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.0;
        write!(
            f,
            "{:<20} {:<12} {:<13} {}s",
            c.device, c.peer, c.rank, c.timeout_s
        )
    }
}

/// One history entry
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct HistoryRow(pub HistoryRecord);

impl fmt::Display for HistoryRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.0;
        let when = r.timestamp().format("%Y-%m-%d %H:%M:%S");
        match r.state {
            HistoryState::Success => write!(
                f,
                "{} of {} by {} for {}@{}: OK ({})",
                r.action,
                r.target,
                r.delegate.as_deref().unwrap_or("-"),
                r.origin,
                r.coordinator,
                when
            ),
            HistoryState::Pending => write!(
                f,
                "{} of {} for {}@{}: pending (since {})",
                r.action, r.target, r.origin, r.coordinator, when
            ),
            HistoryState::Failure | HistoryState::Cancelled => write!(
                f,
                "{} of {} for {}@{}: failed rc={} {} ({})",
                r.action,
                r.target,
                r.origin,
                r.coordinator,
                r.rc,
                r.reason.as_deref().unwrap_or(""),
                when
            ),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct StatusView(pub DaemonStatus);

impl fmt::Display for StatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.0;
        writeln!(f, "fenced {} on {}", s.version, s.node)?;
        writeln!(f, "  uptime:     {}s", s.uptime_secs)?;
        writeln!(f, "  devices:    {} ({} busy)", s.devices, s.busy_devices)?;
        writeln!(f, "  levels:     {}", s.levels)?;
        writeln!(f, "  operations: {}", s.operations)?;
        if s.active_peers.is_empty() {
            write!(f, "  peers:      none")
        } else {
            write!(f, "  peers:      {}", s.active_peers.join(", "))
        }
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
