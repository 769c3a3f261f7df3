// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for fieldops-core operations.

use thiserror::Error;

/// All possible errors that can occur in fieldops-core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("action not found: {0}")]
    ActionNotFound(String),

    #[error("failed action not found: {0}")]
    FailedActionNotFound(String),

    #[error("invalid action kind: '{0}'\n  hint: valid kinds are: create, update, delete")]
    InvalidActionKind(String),

    #[error("invalid payload for {kind} on {entity}: {reason}")]
    InvalidPayload {
        kind: String,
        entity: String,
        reason: String,
    },

    #[error("invalid battery mode: '{0}'\n  hint: valid modes are: high_accuracy, balanced, power_saver, ultra_saver")]
    InvalidMode(String),

    #[error("invalid conflict resolution: '{0}'\n  hint: valid policies are: client_wins, server_wins, merge, manual")]
    InvalidResolution(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

/// A specialized Result type for fieldops-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
