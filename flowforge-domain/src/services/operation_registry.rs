// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Operation Layer
//!
//! An operation type (`pretty_print`, `serialize`, `deserialize`,
//! `extract_metadata`, `create_from`, `import_data`, `export_as`,
//! `render_value`, `filter`, ...) is a polymorphic facade that dispatches by
//! a value-type key to a concrete [`Manifest`] template (§4.J). The concrete
//! modules behind each registration are an explicitly out-of-scope external
//! collaborator (§1); this registry only owns the dispatch table and the
//! input field remapping, so `apply_operation` can resolve a manifest and
//! submit a job exactly as if the caller had named it directly - inheriting
//! all caching and lineage behavior.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::entities::Manifest;
use crate::error::EngineError;

/// A dispatch table entry: the manifest to submit, plus how to rename the
/// operation's logical input names onto the target module's field names.
#[derive(Debug, Clone)]
pub struct ManifestTemplate {
    pub manifest: Manifest,
    /// operation input name -> module field name.
    pub input_field_map: HashMap<String, String>,
}

impl ManifestTemplate {
    pub fn new(manifest: Manifest) -> Self {
        Self { manifest, input_field_map: HashMap::new() }
    }

    pub fn with_field_mapping(mut self, operation_field: impl Into<String>, module_field: impl Into<String>) -> Self {
        self.input_field_map.insert(operation_field.into(), module_field.into());
        self
    }

    /// Renames an operation-shaped input map onto the module's declared
    /// field names, passing through any field with no explicit mapping.
    pub fn remap_inputs(&self, inputs: HashMap<String, JsonValue>) -> HashMap<String, JsonValue> {
        inputs
            .into_iter()
            .map(|(field, value)| {
                let mapped = self.input_field_map.get(&field).cloned().unwrap_or(field);
                (mapped, value)
            })
            .collect()
    }
}

/// `(operation_type, dispatch_key) -> ManifestTemplate`, built once at
/// context construction from every registered module's operation-type
/// annotations (§4.J). Registration is last-write-wins by design: a later
/// registration for the same key is how a deployment overrides a built-in
/// operation with a custom module.
#[derive(Default)]
pub struct OperationRegistry {
    table: HashMap<(String, String), ManifestTemplate>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operation_type: impl Into<String>, dispatch_key: impl Into<String>, template: ManifestTemplate) {
        self.table.insert((operation_type.into(), dispatch_key.into()), template);
    }

    /// Resolves `(operation_type, dispatch_key)` to the manifest template a
    /// caller should submit as a job. `dispatch_key` is typically the
    /// principal input's value-type name, but callers may also pass a
    /// supertype name a [`crate::entities::DataType`] declares itself a
    /// subtype of, to reuse a broader registration (e.g. `file_bundle`
    /// falling back to an `any` registration).
    pub fn resolve(&self, operation_type: &str, dispatch_key: &str) -> Result<&ManifestTemplate, EngineError> {
        self.table
            .get(&(operation_type.to_string(), dispatch_key.to_string()))
            .ok_or_else(|| {
                EngineError::InvalidConfiguration(format!(
                    "no module registered for operation {operation_type} on type {dispatch_key}"
                ))
            })
    }

    pub fn is_registered(&self, operation_type: &str, dispatch_key: &str) -> bool {
        self.table.contains_key(&(operation_type.to_string(), dispatch_key.to_string()))
    }
}
