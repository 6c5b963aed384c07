// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Engine Configuration
//!
//! Layered configuration - defaults, then an optional file, then environment
//! variables - following the teacher's `config` crate usage
//! (`infrastructure/config.rs`). Covers the context root directory, which
//! archive backend to use, the parallel processor's worker pool size, and
//! the default per-job timeout (§6 "Environment & persisted layout").
//!
//! The context is selected by the `FLOWFORGE_CONTEXT` environment variable,
//! defaulting to `"default"`, per §6: each named context gets its own
//! subdirectory under the context root.

use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use flowforge_domain::EngineError;

/// Which concrete archive backend an [`EngineContext`](crate::application::context::EngineContext)
/// should construct for a given archive kind.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveBackend {
    Filesystem,
    Sqlite,
}

impl Default for ArchiveBackend {
    fn default() -> Self {
        ArchiveBackend::Filesystem
    }
}

/// Which [`crate::infrastructure::processor::Processor`] strategy the
/// context dispatches steps to (§4.I "Required variants").
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorKind {
    Synchronous,
    Parallel,
}

impl Default for ProcessorKind {
    fn default() -> Self {
        ProcessorKind::Parallel
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The root directory under which every archive kind's subdirectory
    /// lives, per §6 "persisted layout".
    pub context_root: PathBuf,

    /// The name of the selected context; contexts are siblings under
    /// `context_root`.
    pub context_name: String,

    pub archive_backend: ArchiveBackend,

    pub processor_kind: ProcessorKind,

    /// `None` defers to [`flowforge_domain::WorkerCount::from_available_parallelism`].
    pub worker_pool_size: Option<usize>,

    pub job_timeout_default_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context_root: PathBuf::from("./.flowforge"),
            context_name: "default".to_string(),
            archive_backend: ArchiveBackend::Filesystem,
            processor_kind: ProcessorKind::Parallel,
            worker_pool_size: None,
            job_timeout_default_secs: 300,
        }
    }
}

impl EngineConfig {
    /// Builds configuration by layering, in increasing precedence: compiled
    /// defaults, an optional `flowforge.toml` / `flowforge.yaml` in the
    /// current directory, then `FLOWFORGE_*` environment variables (e.g.
    /// `FLOWFORGE_CONTEXT_ROOT`, `FLOWFORGE_WORKER_POOL_SIZE`).
    pub fn load() -> Result<Self, EngineError> {
        let defaults = Self::default();
        let built = Config::builder()
            .set_default("context_root", defaults.context_root.to_string_lossy().to_string())
            .map_err(config_err)?
            .set_default("context_name", defaults.context_name.clone())
            .map_err(config_err)?
            .set_default("archive_backend", "filesystem")
            .map_err(config_err)?
            .set_default("processor_kind", "parallel")
            .map_err(config_err)?
            .set_default("job_timeout_default_secs", defaults.job_timeout_default_secs)
            .map_err(config_err)?
            .add_source(File::with_name("flowforge").required(false))
            .add_source(Environment::with_prefix("FLOWFORGE").separator("_"))
            .build()
            .map_err(config_err)?;

        let context_name = std::env::var("FLOWFORGE_CONTEXT").unwrap_or_else(|_| defaults.context_name.clone());

        let mut engine_config: EngineConfig = built.try_deserialize().map_err(config_err)?;
        engine_config.context_name = context_name;
        Ok(engine_config)
    }

    /// The directory one archive kind's backend should persist into:
    /// `<context_root>/<context_name>/<kind>`.
    pub fn archive_dir(&self, kind: &str) -> PathBuf {
        self.context_root.join(&self.context_name).join(kind)
    }

    pub fn worker_count(&self) -> flowforge_domain::value_objects::WorkerCount {
        match self.worker_pool_size {
            Some(n) => flowforge_domain::value_objects::WorkerCount::new(n).unwrap_or_default(),
            None => flowforge_domain::value_objects::WorkerCount::from_available_parallelism(),
        }
    }
}

fn config_err(err: config::ConfigError) -> EngineError {
    EngineError::InvalidConfiguration(err.to_string())
}
