// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-target history log merged across peers
//!
//! Records are keyed by op id. The first record written for an op id wins;
//! the only later write accepted is a terminal record replacing a pending
//! placeholder. Each target keeps at most `cap` records, oldest evicted.

use chrono::{DateTime, Utc};
use fenced_core::{Action, HistoryRecord, HistoryState, OpId};
use std::collections::HashMap;
use std::time::Duration;

/// Records kept per target unless configured otherwise
pub const DEFAULT_CAP: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    /// A pending placeholder was replaced by its terminal record
    Upgraded,
    /// Already known; nothing changed
    Discarded,
}

impl AppendOutcome {
    pub fn changed(&self) -> bool {
        !matches!(self, AppendOutcome::Discarded)
    }
}

#[derive(Debug)]
pub struct HistoryStore {
    cap: usize,
    /// Sorted by (timestamp, op id)
    by_target: HashMap<String, Vec<HistoryRecord>>,
    /// Op id -> target
    index: HashMap<OpId, String>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAP)
    }
}

impl HistoryStore {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            by_target: HashMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn append(&mut self, record: HistoryRecord) -> AppendOutcome {
        if let Some(target) = self.index.get(&record.op_id) {
            let Some(records) = self.by_target.get_mut(target) else {
                return AppendOutcome::Discarded;
            };
            let Some(pos) = records.iter().position(|r| r.op_id == record.op_id) else {
                return AppendOutcome::Discarded;
            };
            if records[pos].is_terminal() || !record.is_terminal() {
                return AppendOutcome::Discarded;
            }
            records.remove(pos);
            insert_sorted(records, record);
            return AppendOutcome::Upgraded;
        }

        let target = record.target.clone();
        self.index.insert(record.op_id.clone(), target.clone());
        let records = self.by_target.entry(target.clone()).or_default();
        insert_sorted(records, record);

        if records.len() > self.cap {
            let evicted = records.remove(0);
            tracing::debug!(host = %target, op_id = %evicted.op_id, "evicted history record");
            self.index.remove(&evicted.op_id);
        }
        AppendOutcome::Inserted
    }

    pub fn get(&self, op_id: &OpId) -> Option<&HistoryRecord> {
        let target = self.index.get(op_id)?;
        self.by_target
            .get(target)?
            .iter()
            .find(|r| &r.op_id == op_id)
    }

    /// Look up a record by op id or unique op id prefix
    pub fn find(&self, id: &str) -> Option<&HistoryRecord> {
        if let Some(record) = self.get(&OpId::from(id)) {
            return Some(record);
        }
        let matches: Vec<&OpId> = self
            .index
            .keys()
            .filter(|k| k.0.starts_with(id))
            .collect();
        match matches.as_slice() {
            [only] => self.get(only),
            _ => None,
        }
    }

    /// Records of one target, oldest first
    pub fn for_target(&self, target: &str) -> Vec<HistoryRecord> {
        self.by_target.get(target).cloned().unwrap_or_default()
    }

    /// Every record, ordered by (timestamp, op id)
    pub fn all(&self) -> Vec<HistoryRecord> {
        let mut all: Vec<HistoryRecord> = self.by_target.values().flatten().cloned().collect();
        all.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        all
    }

    /// Records newer than `since`; everything when `since` is `None`
    pub fn since(&self, since: Option<DateTime<Utc>>) -> Vec<HistoryRecord> {
        match since {
            None => self.all(),
            Some(ts) => self
                .all()
                .into_iter()
                .filter(|r| r.timestamp() > ts)
                .collect(),
        }
    }

    /// Newest timestamp held, used as the starting point of a sync
    pub fn high_water_mark(&self) -> Option<DateTime<Utc>> {
        self.by_target
            .values()
            .flatten()
            .map(HistoryRecord::timestamp)
            .max()
    }

    /// Most recent success for `(target, action)` that ended within `within`
    /// of `now`
    pub fn recent_success(
        &self,
        target: &str,
        action: Action,
        within: Duration,
        now: DateTime<Utc>,
    ) -> Option<&HistoryRecord> {
        let window = chrono::Duration::from_std(within).ok()?;
        self.by_target.get(target)?.iter().rev().find(|r| {
            r.action == action
                && r.state == HistoryState::Success
                && r.ended.is_some_and(|ended| now - ended <= window)
        })
    }
}

fn insert_sorted(records: &mut Vec<HistoryRecord>, record: HistoryRecord) {
    let pos = records.partition_point(|r| r.sort_key() <= record.sort_key());
    records.insert(pos, record);
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
