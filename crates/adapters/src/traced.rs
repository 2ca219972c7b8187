// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::agent::{AgentAdapter, AgentError, AgentInvocation, AgentOutput};
use crate::peer::{PeerAdapter, PeerError};
use async_trait::async_trait;
use fenced_core::PeerMessage;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

/// Wrapper that adds tracing to any AgentAdapter
#[derive(Clone)]
pub struct TracedAgentAdapter<A> {
    inner: A,
}

impl<A> TracedAgentAdapter<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<A: AgentAdapter> AgentAdapter for TracedAgentAdapter<A> {
    async fn execute(
        &self,
        invocation: AgentInvocation,
        cancel: watch::Receiver<bool>,
    ) -> Result<AgentOutput, AgentError> {
        let span = tracing::info_span!(
            "agent.execute",
            device = %invocation.device,
            agent = %invocation.agent,
            action = invocation.agent_action(),
        );

        async move {
            tracing::info!(
                timeout_ms = invocation.timeout.as_millis() as u64,
                args = invocation.args.len(),
                "starting"
            );

            // Precondition: the binary must exist
            if !self.inner.is_installed(&invocation.agent) {
                tracing::error!("agent not installed");
                return Err(AgentError::NotInstalled(invocation.agent));
            }

            let start = std::time::Instant::now();
            let result = self.inner.execute(invocation, cancel).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match &result {
                Ok(out) => tracing::info!(elapsed_ms, stdout_len = out.stdout.len(), "agent succeeded"),
                Err(AgentError::Cancelled) => tracing::info!(elapsed_ms, "agent cancelled"),
                Err(e) => tracing::warn!(elapsed_ms, error = %e, "agent failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    fn is_installed(&self, agent: &str) -> bool {
        self.inner.is_installed(agent)
    }

    async fn list_installed(&self) -> Result<Vec<String>, AgentError> {
        let result = self.inner.list_installed().await;
        tracing::debug!(count = result.as_ref().map(|v| v.len()).ok(), "listed agents");
        result
    }

    async fn metadata(&self, agent: &str, timeout: Duration) -> Result<String, AgentError> {
        let result = self
            .inner
            .metadata(agent, timeout)
            .instrument(tracing::info_span!("agent.metadata", agent))
            .await;
        if let Err(e) = &result {
            tracing::warn!(agent, error = %e, "metadata failed");
        }
        result
    }
}

/// Wrapper that adds tracing to any PeerAdapter
#[derive(Clone)]
pub struct TracedPeerAdapter<P> {
    inner: P,
}

impl<P> TracedPeerAdapter<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<P: PeerAdapter> PeerAdapter for TracedPeerAdapter<P> {
    async fn send(&self, peer: &str, message: PeerMessage) -> Result<(), PeerError> {
        let kind = message.kind();
        let result = self
            .inner
            .send(peer, message)
            .instrument(tracing::debug_span!("peer.send", peer, kind))
            .await;
        match &result {
            Ok(()) => tracing::debug!(peer, kind, "queued"),
            Err(e) => tracing::warn!(peer, kind, error = %e, "send failed"),
        }
        result
    }

    async fn broadcast(&self, message: PeerMessage) -> Result<(), PeerError> {
        let kind = message.kind();
        let result = self
            .inner
            .broadcast(message)
            .instrument(tracing::debug_span!("peer.broadcast", kind))
            .await;
        // A single unreachable peer is routine during membership churn
        match &result {
            Ok(()) => tracing::trace!(kind, "broadcast queued"),
            Err(e) => tracing::debug!(kind, error = %e, "broadcast incomplete"),
        }
        result
    }

    fn peers(&self) -> Vec<String> {
        self.inner.peers()
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
