// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Data Type Descriptor & Registry
//!
//! A process-wide registry maps a type name to a [`DataType`] descriptor:
//! the set of representation classes it accepts, its validation predicate,
//! and the subtype relations used by operation dispatch (§4.J). Descriptors
//! are immutable once registered; registration is fail-fast on duplicate
//! names so a second, silently-different definition of `"file"` can never
//! shadow the first.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value as JsonValue;

use crate::error::EngineError;

/// The representation class a data type's payload is encoded as, for
/// canonicalization and validation purposes.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RepresentationClass {
    None,
    Boolean,
    Bytes,
    Text,
    Dict,
    Opaque,
}

/// A validation predicate run against a candidate payload, encoded as JSON
/// for cross-type uniformity. Implementors live in the infrastructure layer
/// (built-in types) or are supplied by modules registering custom types.
pub trait TypeValidator: Send + Sync {
    fn validate(&self, payload: &JsonValue) -> Result<(), String>;
}

/// A named, versioned capability bundle for one data type.
#[derive(Clone)]
pub struct DataType {
    name: String,
    version: u32,
    representation: RepresentationClass,
    subtypes_of: Vec<String>,
    validator: Option<Arc<dyn TypeValidator>>,
}

impl DataType {
    pub fn new(name: impl Into<String>, representation: RepresentationClass) -> Self {
        Self {
            name: name.into(),
            version: 1,
            representation,
            subtypes_of: Vec::new(),
            validator: None,
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Declares that this type is dispatch-compatible with `parent` (e.g.
    /// `file_bundle` accepting wherever `any` is accepted).
    pub fn with_subtype_of(mut self, parent: impl Into<String>) -> Self {
        self.subtypes_of.push(parent.into());
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn TypeValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn representation(&self) -> RepresentationClass {
        self.representation
    }

    pub fn accepts_as(&self, other_type_name: &str) -> bool {
        self.name == other_type_name || self.subtypes_of.iter().any(|p| p == other_type_name)
    }

    /// Runs the type's validator, if any, surfacing a `TypeValidationError`
    /// at `path` on failure.
    pub fn validate(&self, path: &str, payload: &JsonValue) -> Result<(), EngineError> {
        if let Some(validator) = &self.validator {
            validator.validate(payload).map_err(|reason| EngineError::TypeValidation {
                path: path.to_string(),
                reason,
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataType")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("representation", &self.representation)
            .field("subtypes_of", &self.subtypes_of)
            .finish()
    }
}

/// Process-wide registry of [`DataType`] descriptors, keyed by name.
#[derive(Default)]
pub struct DataTypeRegistry {
    types: RwLock<HashMap<String, DataType>>,
}

impl DataTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the engine's built-in core types: `none`, `any`, `bytes`,
    /// `string`, `boolean`, `dict`, `file`, `file_bundle`, `python_object`.
    pub fn with_core_types() -> Self {
        let registry = Self::new();
        for (name, representation) in [
            ("none", RepresentationClass::None),
            ("any", RepresentationClass::Opaque),
            ("bytes", RepresentationClass::Bytes),
            ("string", RepresentationClass::Text),
            ("boolean", RepresentationClass::Boolean),
            ("dict", RepresentationClass::Dict),
            ("file", RepresentationClass::Opaque),
            ("file_bundle", RepresentationClass::Opaque),
            ("python_object", RepresentationClass::Opaque),
        ] {
            let mut data_type = DataType::new(name, representation);
            if name != "any" {
                data_type = data_type.with_subtype_of("any");
            }
            registry
                .register(data_type)
                .expect("built-in type names are distinct by construction");
        }
        registry
    }

    pub fn register(&self, data_type: DataType) -> Result<(), EngineError> {
        let mut types = self.types.write();
        if types.contains_key(data_type.name()) {
            return Err(EngineError::DuplicateType(data_type.name().to_string()));
        }
        types.insert(data_type.name().to_string(), data_type);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<DataType> {
        self.types.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }
}
