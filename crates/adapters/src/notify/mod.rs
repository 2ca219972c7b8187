// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification adapters

mod command;
mod log;

pub use command::CommandNotifyAdapter;
pub use log::LogNotifyAdapter;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeNotifyAdapter, NotifyCall};

use async_trait::async_trait;
use thiserror::Error;

/// Channel for operation outcomes
pub const CHANNEL_FENCE: &str = "fence";
/// Channel for device and level changes
pub const CHANNEL_CONFIG: &str = "config";

/// Errors from notification operations
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notify command failed: {0}")]
    CommandFailed(String),
    #[error("notify command timed out")]
    Timeout,
}

/// Adapter for delivering notifications
#[async_trait]
pub trait NotifyAdapter: Clone + Send + Sync + 'static {
    async fn send(&self, channel: &str, message: &str) -> Result<(), NotifyError>;
}
