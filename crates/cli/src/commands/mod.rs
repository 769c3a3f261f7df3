// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod clean_cache;
pub mod enqueue;
pub mod list;
pub mod mode;
pub mod policy;
pub mod retry;
pub mod stats;
#[cfg(test)]
#[path = "mod_tests.rs"]
pub mod testing;
pub mod watch;

use std::path::{Path, PathBuf};

use fieldops_core::LocalStore;
use tracing::debug;

use crate::config::{default_config_path, Config};
use crate::error::Result;

/// Resolved configuration and store location for one invocation.
pub struct Context {
    pub config: Config,
    pub store_path: PathBuf,
}

impl Context {
    /// An explicit `config_path` must exist; the default location may be absent.
    pub fn load(config_path: Option<&Path>, store_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => Config::load(path)?,
            None => Config::load_or_default(&default_config_path())?,
        };
        let store_path = match store_path {
            Some(path) => path.to_path_buf(),
            None => config.store_path(),
        };
        Ok(Context { config, store_path })
    }

    /// Helper to open the local store from the current context.
    pub fn open_store(&self) -> Result<LocalStore> {
        debug!(path = %self.store_path.display(), "opening store");
        Ok(LocalStore::open(&self.store_path)?)
    }
}
