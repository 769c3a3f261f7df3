// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Conflict resolution policy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// App state key under which the active policy is persisted.
pub const RESOLUTION_STATE_KEY: &str = "conflict_resolution";

/// How a version conflict between a local action and the remote is settled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Re-apply the local action over the remote state.
    ClientWins,
    /// Discard the local action and adopt the remote state.
    ServerWins,
    /// Field-level merge, newer timestamp wins on overlapping fields.
    #[default]
    Merge,
    /// Leave the action pending and report the conflict.
    Manual,
}

impl ConflictResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictResolution::ClientWins => "client_wins",
            ConflictResolution::ServerWins => "server_wins",
            ConflictResolution::Merge => "merge",
            ConflictResolution::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConflictResolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "client_wins" | "clientwins" => Ok(ConflictResolution::ClientWins),
            "server_wins" | "serverwins" => Ok(ConflictResolution::ServerWins),
            "merge" => Ok(ConflictResolution::Merge),
            "manual" => Ok(ConflictResolution::Manual),
            _ => Err(Error::InvalidResolution(s.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
