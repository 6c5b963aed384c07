// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline State
//!
//! The mutable half of a running [`crate::aggregates::pipeline_structure::PipelineStructure`]
//! instance (§4.H). One [`ValueSlot`] exists per field - every pipeline
//! input, every step input, every step output, every pipeline output - each
//! holding the current value reference (or `unset`), a validity flag, and a
//! monotonic update counter.
//!
//! All mutation goes through [`PipelineState`]'s methods, which are the only
//! way a slot is ever replaced; each call is a single atomic swap and
//! returns the [`crate::events::EngineEvent`]s the caller should publish once
//! the swap has landed, so that every update within one logical transition
//! is visible before any callback fires (§5 "Ordering guarantees").
//!
//! This type performs no I/O and does not itself dispatch work to a
//! processor; that orchestration - submitting jobs, waiting on them,
//! threading a worker pool - is an infrastructure concern built on top of
//! the state this module tracks (§4.I lives outside this crate).

use std::collections::BTreeMap;

use crate::aggregates::pipeline_structure::{InputLink, PipelineStructure};
use crate::entities::ValueSchema;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::value_objects::{StepId, ValueId};

/// Identifies one field slot within a running pipeline.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SlotKey {
    PipelineInput(String),
    StepInput { step_id: StepId, field: String },
    StepOutput { step_id: StepId, field: String },
    PipelineOutput(String),
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotKey::PipelineInput(name) => write!(f, "pipeline_input:{name}"),
            SlotKey::StepInput { step_id, field } => write!(f, "{step_id}.{field}"),
            SlotKey::StepOutput { step_id, field } => write!(f, "{step_id}.{field}"),
            SlotKey::PipelineOutput(name) => write!(f, "pipeline_output:{name}"),
        }
    }
}

/// One field's current binding. `valid` is cleared (without discarding the
/// reference) when an upstream slot it depends on changes, so a stale value
/// is never mistaken for a fresh one mid-propagation.
#[derive(Debug, Clone)]
pub struct ValueSlot {
    value_id: Option<ValueId>,
    valid: bool,
    update_counter: u64,
}

impl ValueSlot {
    fn empty() -> Self {
        Self { value_id: None, valid: false, update_counter: 0 }
    }

    pub fn value_id(&self) -> Option<ValueId> {
        self.value_id
    }

    pub fn is_set(&self) -> bool {
        self.value_id.is_some() && self.valid
    }

    pub fn update_counter(&self) -> u64 {
        self.update_counter
    }

    fn set(&mut self, value_id: ValueId) {
        self.value_id = Some(value_id);
        self.valid = true;
        self.update_counter += 1;
    }

    fn invalidate(&mut self) {
        if self.valid {
            self.valid = false;
            self.update_counter += 1;
        }
    }
}

impl Default for ValueSlot {
    fn default() -> Self {
        Self::empty()
    }
}

/// The per-field mutable state of one running pipeline instance.
///
/// Constructed from a compiled [`PipelineStructure`]; every field the
/// structure declares (pipeline inputs, each step's inputs/outputs,
/// pipeline outputs) gets exactly one empty slot up front.
pub struct PipelineState<'a> {
    structure: &'a PipelineStructure,
    slots: BTreeMap<SlotKey, ValueSlot>,
}

impl<'a> PipelineState<'a> {
    pub fn new(structure: &'a PipelineStructure) -> Self {
        let mut slots = BTreeMap::new();
        for name in structure.pipeline_inputs().keys() {
            slots.insert(SlotKey::PipelineInput(name.clone()), ValueSlot::empty());
        }
        for step in structure.steps() {
            for field in step.inputs_schema.keys() {
                slots.insert(
                    SlotKey::StepInput { step_id: step.step_id.clone(), field: field.clone() },
                    ValueSlot::empty(),
                );
            }
            for field in step.outputs_schema.keys() {
                slots.insert(
                    SlotKey::StepOutput { step_id: step.step_id.clone(), field: field.clone() },
                    ValueSlot::empty(),
                );
            }
        }
        for name in structure.pipeline_outputs().keys() {
            slots.insert(SlotKey::PipelineOutput(name.clone()), ValueSlot::empty());
        }
        Self { structure, slots }
    }

    pub fn slot(&self, key: &SlotKey) -> Option<&ValueSlot> {
        self.slots.get(key)
    }

    /// Binds pipeline-level inputs and propagates the change to every
    /// downstream step-input slot wired to one of them, in one logical
    /// tick: every affected slot is updated before any event is returned,
    /// so a caller publishing these in order never observes a partial
    /// transition.
    pub fn set_pipeline_inputs(&mut self, mapping: BTreeMap<String, ValueId>) -> Vec<EngineEvent> {
        let mut changed_pipeline_fields = Vec::new();
        for (field, value_id) in &mapping {
            let key = SlotKey::PipelineInput(field.clone());
            self.slots.entry(key).or_default().set(*value_id);
            changed_pipeline_fields.push(field.clone());
        }

        let mut events = Vec::new();
        if !changed_pipeline_fields.is_empty() {
            events.push(EngineEvent::PipelineInputsChanged { fields: changed_pipeline_fields.clone() });
        }

        for step in self.structure.steps() {
            let mut touched = Vec::new();
            for (input_field, link) in &step.input_links {
                if let InputLink::PipelineInput(pipeline_field) = link {
                    if let Some(value_id) = mapping.get(pipeline_field) {
                        let key = SlotKey::StepInput { step_id: step.step_id.clone(), field: input_field.clone() };
                        self.slots.entry(key).or_default().set(*value_id);
                        touched.push(input_field.clone());
                        self.invalidate_downstream_of(&step.step_id, input_field);
                    }
                }
            }
            if !touched.is_empty() {
                events.push(EngineEvent::StepInputsChanged { step_id: step.step_id.clone(), fields: touched });
            }
        }
        events
    }

    /// Records a completed step's outputs and propagates them to every
    /// downstream step input (and pipeline output) wired to them, again as
    /// one logical tick (§5: stage `n+1` never observes a partial stage-`n`
    /// state).
    pub fn record_step_outputs(&mut self, step_id: &StepId, outputs: BTreeMap<String, ValueId>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        let mut own_fields = Vec::new();
        for (field, value_id) in &outputs {
            let key = SlotKey::StepOutput { step_id: step_id.clone(), field: field.clone() };
            self.slots.entry(key).or_default().set(*value_id);
            own_fields.push(field.clone());
        }
        if !own_fields.is_empty() {
            events.push(EngineEvent::StepOutputsChanged { step_id: step_id.clone(), fields: own_fields });
        }

        for step in self.structure.steps() {
            let mut touched = Vec::new();
            for (input_field, link) in &step.input_links {
                if let InputLink::StepOutput { step_id: source_id, output_field } = link {
                    if source_id == step_id {
                        if let Some(value_id) = outputs.get(output_field) {
                            let key = SlotKey::StepInput { step_id: step.step_id.clone(), field: input_field.clone() };
                            self.slots.entry(key).or_default().set(*value_id);
                            touched.push(input_field.clone());
                        }
                    }
                }
            }
            if !touched.is_empty() {
                events.push(EngineEvent::StepInputsChanged { step_id: step.step_id.clone(), fields: touched });
            }
        }

        let mut pipeline_fields = Vec::new();
        for (output_name, (source_step, field)) in self.structure.pipeline_outputs() {
            if source_step == step_id {
                if let Some(value_id) = outputs.get(field) {
                    self.slots
                        .entry(SlotKey::PipelineOutput(output_name.clone()))
                        .or_default()
                        .set(*value_id);
                    pipeline_fields.push(output_name.clone());
                }
            }
        }
        if !pipeline_fields.is_empty() {
            events.push(EngineEvent::PipelineOutputsChanged { fields: pipeline_fields });
        }

        events
    }

    /// Invalidates every step-input slot (and transitively, their steps'
    /// outputs) that depends on one changed input of `step_id`, so a
    /// re-submission of upstream inputs never leaves a stale downstream
    /// output looking ready.
    fn invalidate_downstream_of(&mut self, step_id: &StepId, _input_field: &str) {
        if let Some(step) = self.structure.step(step_id) {
            for field in step.outputs_schema.keys() {
                let key = SlotKey::StepOutput { step_id: step_id.clone(), field: field.clone() };
                self.slots.entry(key).or_default().invalidate();
            }
        }
    }

    /// Whether every input slot of `step_id` is set and valid against the
    /// step's declared schema (optional fields may remain unset).
    pub fn step_is_ready(&self, step_id: &StepId) -> Result<bool, EngineError> {
        let step = self
            .structure
            .step(step_id)
            .ok_or_else(|| EngineError::StepNotReady { step_id: step_id.to_string(), reason: "unknown step".to_string() })?;
        for (field, schema) in &step.inputs_schema {
            let key = SlotKey::StepInput { step_id: step_id.clone(), field: field.clone() };
            let ready = self.slots.get(&key).map(|s| s.is_set()).unwrap_or(false);
            if !ready && !schema.optional {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Fails with [`EngineError::StepNotReady`] if any required input slot
    /// is unset, naming the first missing field for diagnostics.
    pub fn require_step_ready(&self, step_id: &StepId) -> Result<(), EngineError> {
        let step = self
            .structure
            .step(step_id)
            .ok_or_else(|| EngineError::StepNotReady { step_id: step_id.to_string(), reason: "unknown step".to_string() })?;
        for (field, schema) in &step.inputs_schema {
            let key = SlotKey::StepInput { step_id: step_id.clone(), field: field.clone() };
            let ready = self.slots.get(&key).map(|s| s.is_set()).unwrap_or(false);
            if !ready && !schema.optional {
                return Err(EngineError::StepNotReady {
                    step_id: step_id.to_string(),
                    reason: format!("input {field} is not set"),
                });
            }
        }
        Ok(())
    }

    /// The resolved inputs of `step_id`, ready to hand to a processor.
    /// Assumes [`Self::step_is_ready`] already returned `true`.
    pub fn step_inputs(&self, step_id: &StepId) -> BTreeMap<String, ValueId> {
        self.structure
            .step(step_id)
            .into_iter()
            .flat_map(|step| step.inputs_schema.keys())
            .filter_map(|field| {
                let key = SlotKey::StepInput { step_id: step_id.clone(), field: field.clone() };
                self.slots.get(&key).and_then(|s| s.value_id()).map(|v| (field.clone(), v))
            })
            .collect()
    }

    pub fn step_input_schemas(&self, step_id: &StepId) -> BTreeMap<String, ValueSchema> {
        self.structure.step(step_id).map(|s| s.inputs_schema.clone()).unwrap_or_default()
    }

    /// Whether every declared pipeline output slot is set.
    pub fn pipeline_is_finished(&self) -> bool {
        self.structure
            .pipeline_outputs()
            .keys()
            .all(|name| self.slots.get(&SlotKey::PipelineOutput(name.clone())).map(|s| s.is_set()).unwrap_or(false))
    }

    pub fn pipeline_outputs(&self) -> BTreeMap<String, ValueId> {
        self.structure
            .pipeline_outputs()
            .keys()
            .filter_map(|name| {
                self.slots
                    .get(&SlotKey::PipelineOutput(name.clone()))
                    .and_then(|s| s.value_id())
                    .map(|v| (name.clone(), v))
            })
            .collect()
    }
}
