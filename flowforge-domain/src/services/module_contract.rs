// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Module Contract
//!
//! A module is the abstract unit of work (§4.E): constructed from a
//! [`Manifest`], it declares typed input/output schemas and a pure
//! `process` function. Modules are never stored; they are reconstructed
//! from their manifest whenever a job needs to run. Two manifests with the
//! same manifest hash must produce interchangeable modules - the engine
//! never checks this, but every built-in module is written to uphold it.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::entities::{Manifest, Value, ValueSchema};
use crate::error::EngineError;

pub type ValueMap = BTreeMap<String, Value>;
pub type SchemaMap = BTreeMap<String, ValueSchema>;

/// The abstract unit of work. Implementors live outside the domain crate
/// (built-in modules are an explicitly out-of-scope external collaborator,
/// §1); the domain only depends on this contract.
#[async_trait]
pub trait Module: Send + Sync {
    fn inputs_schema(&self) -> SchemaMap;
    fn outputs_schema(&self) -> SchemaMap;

    /// Executes the module against resolved inputs. A recoverable business
    /// failure should be returned as `Ok(Err(...))`-shaped via
    /// [`EngineError::ModuleFailure`]; anything else the implementation lets
    /// escape is treated by the processor as [`EngineError::ModuleCrash`].
    async fn process(&self, inputs: ValueMap) -> Result<ValueMap, EngineError>;
}

/// Resolves a manifest to a constructed module, without running it.
/// Compilation of a [`crate::aggregates::pipeline_structure::PipelineStructure`]
/// uses this port to derive each step's input/output schemas without
/// invoking `process`.
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    async fn resolve(&self, manifest: &Manifest) -> Result<Box<dyn Module>, EngineError>;
}
