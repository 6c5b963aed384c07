// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Value Registry
//!
//! The in-memory, content-addressed graph of live values (§4.C). The
//! registry is the only place a [`Value`] is constructed; it deduplicates by
//! value hash within its own lifetime and never mutates a value once
//! inserted. Persistence is a separate concern, handled by the archive/store
//! layer (§4.D) the caller drives with the values this registry hands back.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value as JsonValue;

use crate::entities::{Value, ValueSchema};
use crate::error::EngineError;
use crate::value_objects::{ValueHash, ValueId, ValueOrigin, ValueStatus};

/// How a caller names the value they want resolved.
#[derive(Debug, Clone)]
pub enum ValueReference {
    Id(ValueId),
    /// `alias:NAME` - resolved through an injected alias lookup since
    /// aliases live in the archive layer, outside this in-memory registry.
    Alias(String),
    /// An inline literal, registered on the fly against a declared schema.
    Literal { schema: ValueSchema, payload_bytes: Vec<u8> },
}

/// A read-many/write-rare in-memory store of registered values, keyed both
/// by id and by content hash for `register_value`'s dedup guarantee.
#[derive(Default)]
pub struct ValueRegistry {
    by_id: RwLock<HashMap<ValueId, Arc<Value>>>,
    by_hash: RwLock<HashMap<ValueHash, Arc<Value>>>,
}

impl ValueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a value, deduplicating by value hash. `payload_bytes` must
    /// already be the type's canonical encoding - the registry does not
    /// canonicalize on the caller's behalf, only hashes what it is given.
    pub fn register_value(
        &self,
        schema: ValueSchema,
        data_type_config: Option<JsonValue>,
        payload_bytes: Vec<u8>,
        origin: ValueOrigin,
    ) -> Result<Arc<Value>, EngineError> {
        let candidate = Value::new(schema, data_type_config, payload_bytes, origin, ValueStatus::Set)?;
        let hash = candidate.value_hash();

        if let Some(existing) = self.by_hash.read().get(&hash) {
            return Ok(existing.clone());
        }

        let mut by_hash = self.by_hash.write();
        if let Some(existing) = by_hash.get(&hash) {
            return Ok(existing.clone());
        }
        let value = Arc::new(candidate);
        by_hash.insert(hash, value.clone());
        self.by_id.write().insert(value.id(), value.clone());
        Ok(value)
    }

    pub fn get(&self, value_id: ValueId) -> Result<Arc<Value>, EngineError> {
        self.by_id
            .read()
            .get(&value_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownValue(value_id.to_string()))
    }

    pub fn get_by_hash(&self, hash: ValueHash) -> Result<Arc<Value>, EngineError> {
        self.by_hash
            .read()
            .get(&hash)
            .cloned()
            .ok_or_else(|| EngineError::UnknownValue(hash.to_string()))
    }

    /// Inserts a value reconstructed elsewhere (e.g. loaded from an
    /// archive), preserving its id and hash rather than minting fresh ones.
    pub fn adopt(&self, value: Value) -> Arc<Value> {
        let value = Arc::new(value);
        self.by_hash.write().insert(value.value_hash(), value.clone());
        self.by_id.write().insert(value.id(), value.clone());
        value
    }

    pub fn resolve(
        &self,
        reference: ValueReference,
        alias_lookup: &dyn Fn(&str) -> Option<ValueId>,
    ) -> Result<Arc<Value>, EngineError> {
        match reference {
            ValueReference::Id(id) => self.get(id),
            ValueReference::Alias(name) => {
                let id = alias_lookup(&name).ok_or_else(|| EngineError::UnknownAlias(name.clone()))?;
                self.get(id)
            }
            ValueReference::Literal { schema, payload_bytes } => {
                self.register_value(schema, None, payload_bytes, ValueOrigin::external("literal"))
            }
        }
    }
}
