// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Index Value Object
//!
//! A step's position in the pipeline's topological ordering: the stage index
//! is one plus the maximum stage index of any step that supplies one of its
//! inputs, with steps fed only by pipeline inputs sitting at stage 1.
//! Compilation assigns these once and they never change for a given compiled
//! [`crate::aggregates::pipeline_structure::PipelineStructure`].

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct StageIndex(u32);

impl StageIndex {
    /// The stage occupied by steps with no step-supplied inputs.
    pub const FIRST: StageIndex = StageIndex(1);

    pub fn new(value: u32) -> Result<Self, EngineError> {
        if value == 0 {
            return Err(EngineError::InvalidConfiguration(
                "stage index must be >= 1".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// The stage index one step downstream of any step at `self`.
    pub fn next(&self) -> StageIndex {
        StageIndex(self.0 + 1)
    }

    /// Given the stage indices of a step's input-supplying steps, the stage
    /// the step itself belongs to (one past the highest predecessor, or
    /// [`StageIndex::FIRST`] if fed only by pipeline inputs).
    pub fn after_predecessors(predecessors: impl IntoIterator<Item = StageIndex>) -> StageIndex {
        predecessors
            .into_iter()
            .map(|p| p.next())
            .max()
            .unwrap_or(StageIndex::FIRST)
    }
}

impl std::fmt::Display for StageIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
