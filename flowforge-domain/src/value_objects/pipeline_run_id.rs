// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Run Id Value Object
//!
//! Identifies one running instance of a compiled
//! [`crate::aggregates::pipeline_structure::PipelineStructure`]. The
//! structure itself is content-addressed by its own hash and may be
//! instantiated (given fresh pipeline inputs, a fresh state machine) more
//! than once; the run id distinguishes those instances from one another.

use crate::value_objects::generic_id::{GenericId, IdCategory};

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PipelineRunCategory;

impl IdCategory for PipelineRunCategory {
    fn category_name() -> &'static str {
        "pipeline_run"
    }
}

pub type PipelineRunId = GenericId<PipelineRunCategory>;
