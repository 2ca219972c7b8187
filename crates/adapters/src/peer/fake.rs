// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake peer adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{PeerAdapter, PeerError};
use async_trait::async_trait;
use fenced_core::PeerMessage;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Recorded peer delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCall {
    Send { peer: String, message: PeerMessage },
    Broadcast { message: PeerMessage },
}

#[derive(Default)]
struct FakePeerState {
    peers: BTreeSet<String>,
    unreachable: BTreeSet<String>,
    calls: Vec<PeerCall>,
}

/// Fake peer adapter for testing
#[derive(Clone, Default)]
pub struct FakePeerAdapter {
    state: Arc<Mutex<FakePeerState>>,
}

impl FakePeerAdapter {
    pub fn new(peers: &[&str]) -> Self {
        let adapter = Self::default();
        adapter.lock().peers = peers.iter().map(|p| p.to_string()).collect();
        adapter
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakePeerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make sends to `peer` fail
    pub fn set_unreachable(&self, peer: &str, unreachable: bool) {
        let mut state = self.lock();
        if unreachable {
            state.unreachable.insert(peer.to_string());
        } else {
            state.unreachable.remove(peer);
        }
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<PeerCall> {
        self.lock().calls.clone()
    }

    /// Messages sent directly to `peer`
    pub fn sent_to(&self, peer: &str) -> Vec<PeerMessage> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                PeerCall::Send { peer: p, message } if p == peer => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Broadcast messages
    pub fn broadcasts(&self) -> Vec<PeerMessage> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                PeerCall::Broadcast { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Remove and return the calls recorded so far
    pub fn take_calls(&self) -> Vec<PeerCall> {
        std::mem::take(&mut self.lock().calls)
    }

    pub fn clear(&self) {
        self.lock().calls.clear();
    }
}

#[async_trait]
impl PeerAdapter for FakePeerAdapter {
    async fn send(&self, peer: &str, message: PeerMessage) -> Result<(), PeerError> {
        let mut state = self.lock();
        if !state.peers.contains(peer) {
            return Err(PeerError::UnknownPeer(peer.to_string()));
        }
        if state.unreachable.contains(peer) {
            return Err(PeerError::Unavailable(peer.to_string()));
        }
        state.calls.push(PeerCall::Send {
            peer: peer.to_string(),
            message,
        });
        Ok(())
    }

    async fn broadcast(&self, message: PeerMessage) -> Result<(), PeerError> {
        let mut state = self.lock();
        let failed = state.unreachable.iter().next().cloned();
        state.calls.push(PeerCall::Broadcast { message });
        match failed {
            Some(peer) => Err(PeerError::Unavailable(peer)),
            None => Ok(()),
        }
    }

    fn peers(&self) -> Vec<String> {
        self.lock().peers.iter().cloned().collect()
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
