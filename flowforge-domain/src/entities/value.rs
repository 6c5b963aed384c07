// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Value Entity
//!
//! An immutable, content-addressed unit of data. A `Value` is created only
//! through [`crate::services::value_registry::ValueRegistry`]; once created
//! its payload and hash are frozen for the lifetime of the process. See §3
//! for the full field list and invariants.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::entities::value_schema::ValueSchema;
use crate::error::EngineError;
use crate::hashing;
use crate::value_objects::{ValueHash, ValueId, ValueOrigin, ValueStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Value {
    id: ValueId,
    schema: ValueSchema,
    data_type_config: Option<JsonValue>,
    payload_bytes: Vec<u8>,
    size: u64,
    value_hash: ValueHash,
    origin: ValueOrigin,
    status: ValueStatus,
    metadata: HashMap<String, JsonValue>,
}

impl Value {
    /// Constructs a frozen value from an already-canonicalized payload. Only
    /// the registry is expected to call this; it owns dedup-by-hash and
    /// referential stability across `register_value` calls.
    pub fn new(
        schema: ValueSchema,
        data_type_config: Option<JsonValue>,
        payload_bytes: Vec<u8>,
        origin: ValueOrigin,
        status: ValueStatus,
    ) -> Result<Self, EngineError> {
        let schema_hash = schema.schema_hash()?;
        let value_hash = compute_value_hash(&schema_hash, &payload_bytes)?;
        let size = payload_bytes.len() as u64;
        Ok(Self {
            id: ValueId::new(),
            schema,
            data_type_config,
            payload_bytes,
            size,
            value_hash,
            origin,
            status,
            metadata: HashMap::new(),
        })
    }

    /// Reconstructs a value as loaded from an archive, preserving its
    /// original id rather than minting a fresh one.
    pub fn from_persisted(
        id: ValueId,
        schema: ValueSchema,
        data_type_config: Option<JsonValue>,
        payload_bytes: Vec<u8>,
        origin: ValueOrigin,
        status: ValueStatus,
        metadata: HashMap<String, JsonValue>,
    ) -> Result<Self, EngineError> {
        let schema_hash = schema.schema_hash()?;
        let value_hash = compute_value_hash(&schema_hash, &payload_bytes)?;
        let size = payload_bytes.len() as u64;
        Ok(Self {
            id,
            schema,
            data_type_config,
            payload_bytes,
            size,
            value_hash,
            origin,
            status,
            metadata,
        })
    }

    pub fn id(&self) -> ValueId {
        self.id
    }

    pub fn schema(&self) -> &ValueSchema {
        &self.schema
    }

    pub fn data_type_config(&self) -> Option<&JsonValue> {
        self.data_type_config.as_ref()
    }

    pub fn payload_bytes(&self) -> &[u8] {
        &self.payload_bytes
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn value_hash(&self) -> ValueHash {
        self.value_hash
    }

    pub fn origin(&self) -> &ValueOrigin {
        &self.origin
    }

    pub fn status(&self) -> ValueStatus {
        self.status
    }

    pub fn metadata(&self) -> &HashMap<String, JsonValue> {
        &self.metadata
    }

    pub fn with_metadata_attachment(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// `value_hash = hash(canonical_encode({schema_hash, payload}))`, per §4.C.
fn compute_value_hash(schema_hash: &crate::value_objects::SchemaHash, payload_bytes: &[u8]) -> Result<ValueHash, EngineError> {
    #[derive(Serialize)]
    struct ValueHashInput<'a> {
        schema_hash: String,
        payload: &'a [u8],
    }
    let input = ValueHashInput { schema_hash: schema_hash.to_string(), payload: payload_bytes };
    Ok(hashing::hash_of(&input)?.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> ValueSchema {
        ValueSchema::new("string")
    }

    #[test]
    fn equal_schema_and_payload_produce_equal_hash() {
        let a = Value::new(sample_schema(), None, b"hello".to_vec(), ValueOrigin::external("a"), ValueStatus::Set).unwrap();
        let b = Value::new(sample_schema(), None, b"hello".to_vec(), ValueOrigin::external("b"), ValueStatus::Set).unwrap();
        assert_eq!(a.value_hash(), b.value_hash());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn differing_payload_changes_hash() {
        let a = Value::new(sample_schema(), None, b"hello".to_vec(), ValueOrigin::external("a"), ValueStatus::Set).unwrap();
        let b = Value::new(sample_schema(), None, b"world".to_vec(), ValueOrigin::external("a"), ValueStatus::Set).unwrap();
        assert_ne!(a.value_hash(), b.value_hash());
    }

    #[test]
    fn size_matches_payload_length() {
        let v = Value::new(sample_schema(), None, b"hello".to_vec(), ValueOrigin::external("a"), ValueStatus::Set).unwrap();
        assert_eq!(v.size(), 5);
    }
}
