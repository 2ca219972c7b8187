// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fencing actions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An action a fencing agent (or the fencer itself) can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    On,
    Off,
    Reboot,
    Status,
    Monitor,
    Metadata,
    List,
    Validate,
    /// Administrative override: record the target as fenced without
    /// running any device
    Confirm,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::On,
        Action::Off,
        Action::Reboot,
        Action::Status,
        Action::Monitor,
        Action::Metadata,
        Action::List,
        Action::Validate,
        Action::Confirm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::On => "on",
            Action::Off => "off",
            Action::Reboot => "reboot",
            Action::Status => "status",
            Action::Monitor => "monitor",
            Action::Metadata => "metadata",
            Action::List => "list",
            Action::Validate => "validate",
            Action::Confirm => "confirm",
        }
    }

    /// Actions that remove power from a node. These deduplicate and can't be
    /// cancelled once dispatched.
    pub fn is_destructive(&self) -> bool {
        matches!(self, Action::Off | Action::Reboot)
    }

    /// Actions that act on a target node (as opposed to the device itself)
    pub fn targets_node(&self) -> bool {
        matches!(
            self,
            Action::On | Action::Off | Action::Reboot | Action::Status | Action::Confirm
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s.trim().to_ascii_lowercase().as_str() {
            "on" => Action::On,
            "off" => Action::Off,
            "reboot" => Action::Reboot,
            "status" => Action::Status,
            "monitor" => Action::Monitor,
            "metadata" | "meta-data" => Action::Metadata,
            "list" => Action::List,
            "validate" | "validate-all" => Action::Validate,
            "confirm" => Action::Confirm,
            _ => return Err(UnknownAction(s.to_string())),
        };
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        off = { "off", Action::Off },
        reboot_upper = { "REBOOT", Action::Reboot },
        meta_data = { "meta-data", Action::Metadata },
        validate_all = { "validate-all", Action::Validate },
    )]
    fn parses_action_names(input: &str, expected: Action) {
        assert_eq!(input.parse::<Action>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_action() {
        assert!("poweroff".parse::<Action>().is_err());
    }

    #[test]
    fn only_off_and_reboot_are_destructive() {
        let destructive: Vec<_> = Action::ALL
            .iter()
            .filter(|a| a.is_destructive())
            .collect();
        assert_eq!(destructive, vec![&Action::Off, &Action::Reboot]);
    }

    #[test]
    fn display_round_trips_through_parse() {
        for action in Action::ALL {
            assert_eq!(action.to_string().parse::<Action>().unwrap(), action);
        }
    }
}
