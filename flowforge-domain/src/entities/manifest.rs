// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Manifest Entity
//!
//! Pairs a module type name with its resolved configuration. The manifest
//! hash is the sole determinant of module equivalence for caching purposes:
//! two manifests with the same hash must yield interchangeable modules
//! (§3, §4.F).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::EngineError;
use crate::hashing;
use crate::value_objects::ManifestHash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub module_type: String,
    /// Sorted so the canonical encoding - and therefore the manifest hash -
    /// does not depend on caller-supplied map ordering.
    pub module_config: BTreeMap<String, JsonValue>,
}

impl Manifest {
    pub fn new(module_type: impl Into<String>) -> Self {
        Self { module_type: module_type.into(), module_config: BTreeMap::new() }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.module_config.insert(key.into(), value);
        self
    }

    /// `manifest_hash(manifest) = hash(canonical_encode({module_type, module_config}))`.
    pub fn manifest_hash(&self) -> Result<ManifestHash, EngineError> {
        Ok(hashing::hash_of(self)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_insertion_order_does_not_affect_hash() {
        let a = Manifest::new("nand").with_config("a", json!(1)).with_config("b", json!(2));
        let b = Manifest::new("nand").with_config("b", json!(2)).with_config("a", json!(1));
        assert_eq!(a.manifest_hash().unwrap(), b.manifest_hash().unwrap());
    }

    #[test]
    fn differing_module_type_changes_hash() {
        let a = Manifest::new("nand");
        let b = Manifest::new("nor");
        assert_ne!(a.manifest_hash().unwrap(), b.manifest_hash().unwrap());
    }
}
