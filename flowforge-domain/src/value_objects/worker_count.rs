// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Count Value Object
//!
//! Bounds the size of the parallel processor's worker pool. A validated
//! newtype rather than a bare `usize` so a zero-worker pool (which would
//! deadlock - ready steps enqueued with nothing ever dispatching them) is
//! rejected at construction instead of at the first `wait_for` that never
//! completes.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct WorkerCount(usize);

impl WorkerCount {
    pub const MAX: usize = 1024;

    pub fn new(count: usize) -> Result<Self, EngineError> {
        if count == 0 {
            return Err(EngineError::InvalidConfiguration(
                "worker count must be at least 1".to_string(),
            ));
        }
        if count > Self::MAX {
            return Err(EngineError::InvalidConfiguration(format!(
                "worker count {count} exceeds maximum {}",
                Self::MAX
            )));
        }
        Ok(Self(count))
    }

    /// One worker per available CPU, as reported by the platform.
    pub fn from_available_parallelism() -> Self {
        let count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self(count.min(Self::MAX))
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for WorkerCount {
    fn default() -> Self {
        Self::from_available_parallelism()
    }
}

impl std::fmt::Display for WorkerCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_workers_is_rejected() {
        assert!(WorkerCount::new(0).is_err());
    }

    #[test]
    fn excessive_workers_is_rejected() {
        assert!(WorkerCount::new(WorkerCount::MAX + 1).is_err());
    }

    #[test]
    fn default_is_at_least_one() {
        assert!(WorkerCount::default().get() >= 1);
    }
}
