// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing support for effects

/// Something the executor logs as one span
pub trait TracedEffect {
    /// Span name (e.g. "run_agent", "send_peer")
    fn name(&self) -> &'static str;

    /// Structured fields logged when the effect starts
    fn fields(&self) -> Vec<(&'static str, String)>;
}
