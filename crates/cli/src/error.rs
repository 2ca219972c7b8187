// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-friendly error display with context and suggestions.
//!
//! Errors carry what went wrong, why it might have happened and how to fix
//! it, plus the exit code `fence-admin` should end with.

use std::fmt;
use std::path::Path;

use fenced_core::FenceError;

use crate::client::ClientError;

/// Exit code for failures without a daemon return code
pub const EXIT_FAILURE: u8 = 1;

/// Registration of an agent that is not installed
const RC_UNKNOWN_AGENT: i32 = -2;

/// Error with context and recovery suggestions for user-friendly display.
#[derive(Debug)]
pub struct AdminError {
    /// What went wrong
    pub message: String,
    /// Why it might have happened
    pub context: Vec<String>,
    /// How to fix it
    pub suggestions: Vec<String>,
    /// Daemon return code, if there was one
    pub rc: Option<i32>,
}

impl AdminError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: Vec::new(),
            suggestions: Vec::new(),
            rc: None,
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_rc(mut self, rc: i32) -> Self {
        self.rc = Some(rc);
        self
    }

    /// Process exit code: the magnitude of the daemon's rc, else 1
    pub fn exit_code(&self) -> u8 {
        match self.rc {
            Some(rc) if rc != 0 => u8::try_from(rc.unsigned_abs()).unwrap_or(u8::MAX),
            _ => EXIT_FAILURE,
        }
    }

    pub fn daemon_not_running(socket: &Path) -> Self {
        AdminError::new("fenced is not running")
            .with_context(format!("No socket at {}", socket.display()))
            .with_suggestion("Start the daemon: systemctl start fenced")
            .with_suggestion("Point at another socket: fence-admin --socket <PATH> ...")
    }

    /// Translate a client error, adding hints for the common daemon answers
    pub fn from_client(err: ClientError) -> Self {
        match err {
            ClientError::DaemonNotRunning(socket) => AdminError::daemon_not_running(&socket),
            ClientError::Rejected { rc, reason } => {
                let kind = match rc {
                    RC_UNKNOWN_AGENT => "UnknownAgent",
                    _ => FenceError::from_rc(rc, reason.clone())
                        .map(|e| e.kind())
                        .unwrap_or("error"),
                };
                let err = AdminError::new(format!("{kind}: {reason}")).with_rc(rc);
                match rc {
                    FenceError::RC_DENIED => err
                        .with_context("The operation needs a privileged client")
                        .with_suggestion("Run as root or as the daemon user")
                        .with_suggestion("Add your uid to privileged_uids in fenced.toml"),
                    FenceError::RC_NO_DEVICES => err
                        .with_context("No registered device claims this target")
                        .with_suggestion("List candidate devices: fence-admin --list <HOST>")
                        .with_suggestion("Check pcmk_host_list / pcmk_host_map of your devices"),
                    RC_UNKNOWN_AGENT => err
                        .with_suggestion("List installed agents: fence-admin --list-installed"),
                    FenceError::RC_TIMEOUT => err
                        .with_suggestion("Retry with a longer budget: --timeout <SECONDS>"),
                    _ => err,
                }
            }
            ClientError::Protocol(e) => AdminError::new(format!("talking to fenced failed: {e}"))
                .with_context("The daemon may have stopped or be overloaded"),
            other => AdminError::new(other.to_string()),
        }
    }
}

impl fmt::Display for AdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            for ctx in &self.context {
                writeln!(f, "  -> {}", ctx)?;
            }
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            writeln!(f, "suggestions:")?;
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for AdminError {}

impl From<ClientError> for AdminError {
    fn from(err: ClientError) -> Self {
        AdminError::from_client(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AdminError::new("Something went wrong")
            .with_context("First context")
            .with_context("Second context")
            .with_suggestion("Try this")
            .with_suggestion("Or this");

        let output = format!("{}", err);
        assert!(output.contains("error: Something went wrong"));
        assert!(output.contains("-> First context"));
        assert!(output.contains("-> Second context"));
        assert!(output.contains("1. Try this"));
        assert!(output.contains("2. Or this"));
    }

    #[test]
    fn rejected_maps_to_kind_and_exit_code() {
        let err = AdminError::from_client(ClientError::Rejected {
            rc: FenceError::RC_NO_DEVICES,
            reason: "node9".to_string(),
        });

        assert_eq!(err.exit_code(), 19);
        assert!(err.message.contains("node9"));
        assert!(!err.suggestions.is_empty());
    }

    #[test]
    fn agent_failure_rc_fits_an_exit_code() {
        let err = AdminError::new("agent failed").with_rc(FenceError::RC_AGENT_FAILURE);
        assert_eq!(err.exit_code(), 201);
    }

    #[test]
    fn errors_without_rc_exit_with_one() {
        let err = AdminError::from_client(ClientError::UnexpectedResponse);
        assert_eq!(err.exit_code(), EXIT_FAILURE);
    }
}
