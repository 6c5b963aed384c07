// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Value Schema Entity
//!
//! Declares the shape a [`crate::entities::value::Value`] must have: its
//! type name, optional per-instance type configuration (e.g. the inner
//! element type of a container), a description, an optional default, and
//! whether the field may be left unset. Two schemas are equal iff their
//! canonical encodings hash-match, per §3.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::EngineError;
use crate::hashing;
use crate::value_objects::SchemaHash;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSchema {
    pub type_name: String,
    pub type_config: Option<JsonValue>,
    pub description: String,
    pub default: Option<JsonValue>,
    pub optional: bool,
}

impl ValueSchema {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            type_config: None,
            description: String::new(),
            default: None,
            optional: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_type_config(mut self, config: JsonValue) -> Self {
        self.type_config = Some(config);
        self
    }

    pub fn with_default(mut self, default: JsonValue) -> Self {
        self.default = Some(default);
        self.optional = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// The schema hash: the canonical content-hash of this schema, used both
    /// as part of a value's type reference and to compare schemas for
    /// structural equality without comparing every field.
    pub fn schema_hash(&self) -> Result<SchemaHash, EngineError> {
        Ok(hashing::hash_of(self)?.into())
    }

    /// A source schema may be used wherever a target schema is declared if
    /// the type names match and the source is at least as permissive
    /// (required fields may feed optional slots, not the reverse).
    pub fn refines(&self, target: &ValueSchema) -> bool {
        if self.type_name != target.type_name {
            return false;
        }
        target.optional || !self.optional
    }
}
