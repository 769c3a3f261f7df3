// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// All possible errors that can occur in the fieldops library.
///
/// Errors provide user-friendly messages with hints for common issues.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] fieldops_core::Error),

    #[error("sync error: {0}")]
    Sync(#[from] crate::sync::SyncError),

    #[error("invalid payload: {0}\n  hint: pass a JSON object, e.g. --payload '{{\"status\":\"in_progress\"}}'")]
    InvalidPayload(String),

    #[error(transparent)]
    Filter(#[from] crate::realtime::FilterError),

    #[error("realtime error: {0}")]
    Realtime(String),

    #[error("nothing to retry: pass an action ID or --all")]
    NothingToRetry,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

/// A specialized Result type for fieldops library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
