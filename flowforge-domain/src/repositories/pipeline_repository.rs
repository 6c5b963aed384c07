// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Repository Port
//!
//! The workflow archive kind (§4.D) holds named
//! [`crate::aggregates::pipeline_structure::PipelineDeclaration`]s so a
//! caller can `list_pipelines`/`get_pipeline` (§4.K) instead of re-supplying
//! the full declaration on every run. Storage is of the declaration, not
//! the compiled structure: a structure is re-derived by
//! [`crate::aggregates::pipeline_structure::PipelineStructure::compile`]
//! against whatever module registry the running process has, which may
//! have gained modules since the declaration was saved.
//!
//! Resumption of a partially-executed pipeline run from its stored
//! declaration is explicitly out of scope (spec Open Question (b)); this
//! port only covers the declaration's storage shape.

use async_trait::async_trait;

use crate::aggregates::pipeline_structure::PipelineDeclaration;
use crate::error::EngineError;

#[async_trait]
pub trait PipelineRepository: Send + Sync {
    async fn save_pipeline(&self, declaration: PipelineDeclaration) -> Result<(), EngineError>;
    async fn load_pipeline(&self, pipeline_name: &str) -> Result<Option<PipelineDeclaration>, EngineError>;
    async fn list_pipelines(&self) -> Result<Vec<String>, EngineError>;
}
