// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP peer transport
//!
//! Each configured peer gets an outbound queue drained by its own writer
//! task, which keeps order per peer. Connections are opened lazily and
//! dropped on the first write error; the message in hand is lost and the
//! failure is reported so the runtime can mark the peer lost.

use super::wire::write_envelope;
use super::{PeerAdapter, PeerError};
use async_trait::async_trait;
use fenced_core::{PeerEnvelope, PeerMessage};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Messages buffered per peer before sends fail
pub const QUEUE_DEPTH: usize = 256;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone)]
pub struct TcpPeerAdapter {
    local: String,
    queues: Arc<HashMap<String, mpsc::Sender<PeerEnvelope>>>,
}

impl TcpPeerAdapter {
    /// Start writer tasks for `peers` (name -> address). Must be called
    /// within a tokio runtime. Delivery failures are reported on `failures`.
    pub fn start(
        local: impl Into<String>,
        peers: &BTreeMap<String, String>,
        failures: mpsc::Sender<String>,
    ) -> Self {
        let local = local.into();
        let mut queues = HashMap::new();
        for (name, addr) in peers {
            if *name == local {
                continue;
            }
            let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
            tokio::spawn(writer(name.clone(), addr.clone(), rx, failures.clone()));
            queues.insert(name.clone(), tx);
        }
        Self {
            local,
            queues: Arc::new(queues),
        }
    }

    fn envelope(&self, message: PeerMessage) -> PeerEnvelope {
        PeerEnvelope {
            from: self.local.clone(),
            message,
        }
    }

    fn enqueue(&self, peer: &str, envelope: PeerEnvelope) -> Result<(), PeerError> {
        let queue = self
            .queues
            .get(peer)
            .ok_or_else(|| PeerError::UnknownPeer(peer.to_string()))?;
        queue
            .try_send(envelope)
            .map_err(|_| PeerError::Unavailable(peer.to_string()))
    }
}

async fn writer(
    peer: String,
    addr: String,
    mut rx: mpsc::Receiver<PeerEnvelope>,
    failures: mpsc::Sender<String>,
) {
    let mut stream: Option<TcpStream> = None;
    while let Some(envelope) = rx.recv().await {
        if stream.is_none() {
            match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
                Ok(Ok(s)) => {
                    tracing::debug!(peer, addr, "connected to peer");
                    stream = Some(s);
                }
                Ok(Err(e)) => {
                    tracing::debug!(peer, addr, error = %e, "peer connect failed");
                    let _ = failures.send(peer.clone()).await;
                    continue;
                }
                Err(_) => {
                    tracing::debug!(peer, addr, "peer connect timed out");
                    let _ = failures.send(peer.clone()).await;
                    continue;
                }
            }
        }
        if let Some(s) = stream.as_mut() {
            if let Err(e) = write_envelope(s, &envelope).await {
                tracing::warn!(peer, kind = envelope.message.kind(), error = %e, "peer write failed");
                stream = None;
                let _ = failures.send(peer.clone()).await;
            }
        }
    }
}

#[async_trait]
impl PeerAdapter for TcpPeerAdapter {
    async fn send(&self, peer: &str, message: PeerMessage) -> Result<(), PeerError> {
        let envelope = self.envelope(message);
        self.enqueue(peer, envelope)
    }

    async fn broadcast(&self, message: PeerMessage) -> Result<(), PeerError> {
        let envelope = self.envelope(message);
        let mut first_err = None;
        for peer in self.queues.keys() {
            if let Err(e) = self.enqueue(peer, envelope.clone()) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn peers(&self) -> Vec<String> {
        let mut peers: Vec<String> = self.queues.keys().cloned().collect();
        peers.sort();
        peers
    }
}

#[cfg(test)]
#[path = "tcp_tests.rs"]
mod tests;
