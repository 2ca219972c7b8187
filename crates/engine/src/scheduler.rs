// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer bookkeeping for the event loop

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Named one-shot timers. Setting an existing id re-arms it.
#[derive(Debug, Default)]
pub struct Scheduler {
    timers: HashMap<String, Instant>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_timer(&mut self, id: String, duration: Duration, now: Instant) {
        let at = now
            .checked_add(duration.min(fenced_core::MAX_TIMEOUT))
            .unwrap_or(now);
        self.timers.insert(id, at);
    }

    pub fn cancel_timer(&mut self, id: &str) {
        self.timers.remove(id);
    }

    pub fn has_timers(&self) -> bool {
        !self.timers.is_empty()
    }

    pub fn has_timer(&self, id: &str) -> bool {
        self.timers.contains_key(id)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().min().copied()
    }

    /// Remove and return the timers due at `now`, earliest first
    pub fn fired_timers(&mut self, now: Instant) -> Vec<String> {
        let mut due: Vec<(Instant, String)> = self
            .timers
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, at)| (*at, id.clone()))
            .collect();
        due.sort();
        for (_, id) in &due {
            self.timers.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
