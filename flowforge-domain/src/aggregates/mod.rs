// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

pub mod pipeline_state;
pub mod pipeline_structure;

pub use pipeline_state::{PipelineState, SlotKey, ValueSlot};
pub use pipeline_structure::{CompiledStep, InputLink, PipelineDeclaration, PipelineStructure, StepDeclaration};
