// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peer transport adapters

mod tcp;
pub mod wire;

pub use tcp::{TcpPeerAdapter, CONNECT_TIMEOUT, QUEUE_DEPTH};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakePeerAdapter, PeerCall};

use async_trait::async_trait;
use fenced_core::PeerMessage;
use thiserror::Error;

/// Errors from peer delivery
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("unknown peer: {0}")]
    UnknownPeer(String),
    #[error("peer {0} is not accepting messages")]
    Unavailable(String),
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Adapter for best-effort, ordered delivery of peer messages
#[async_trait]
pub trait PeerAdapter: Clone + Send + Sync + 'static {
    /// Queue a message for one peer
    async fn send(&self, peer: &str, message: PeerMessage) -> Result<(), PeerError>;

    /// Queue a message for every configured peer
    async fn broadcast(&self, message: PeerMessage) -> Result<(), PeerError>;

    /// Configured peer names, excluding the local node
    fn peers(&self) -> Vec<String>;
}
