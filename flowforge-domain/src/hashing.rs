// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Canonical Encoding & Hashing
//!
//! A single deterministic encoding underlies every content hash in the
//! engine: a CBOR-family encoding (via `ciborium`) with map keys sorted by
//! their own canonical byte encoding, and a single hash algorithm (SHA-256)
//! wrapped in a one-byte self-describing multihash tag so a hash's
//! algorithm never has to be guessed from context.
//!
//! Floating point only ever appears inside a typed value's payload; when it
//! does, it is canonicalized as the big-endian bytes of its IEEE-754
//! representation rather than re-serialized through CBOR's own float rules,
//! so that two encoders agree bit-for-bit (see DESIGN.md, Open Question a).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::EngineError;

/// Algorithm tag for a [`Multihash`]. Only one algorithm is supported today;
/// the tag exists so hashes are self-describing as new algorithms arrive.
const SHA2_256_TAG: u8 = 0x12; // matches the multihash registry code for sha2-256

/// A self-describing content hash: one tag byte followed by the digest.
///
/// `Display`/`FromStr` render as `sha256:<hex>`, matching the wire format's
/// "hashes are multihash-prefixed" requirement.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Multihash {
    tag: u8,
    digest: [u8; 32],
}

impl Multihash {
    fn from_digest(digest: [u8; 32]) -> Self {
        Self { tag: SHA2_256_TAG, digest }
    }

    /// Hashes already-canonical bytes.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest: [u8; 32] = hasher.finalize().into();
        Self::from_digest(digest)
    }

    pub fn algorithm_name(&self) -> &'static str {
        match self.tag {
            SHA2_256_TAG => "sha256",
            _ => "unknown",
        }
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

impl fmt::Display for Multihash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm_name(), self.digest_hex())
    }
}

impl std::str::FromStr for Multihash {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (alg, hex_digest) = s
            .split_once(':')
            .ok_or_else(|| EngineError::Canonicalization(format!("malformed hash: {s}")))?;
        if alg != "sha256" {
            return Err(EngineError::Canonicalization(format!("unsupported hash algorithm: {alg}")));
        }
        let bytes = hex::decode(hex_digest)
            .map_err(|e| EngineError::Canonicalization(format!("invalid hash hex: {e}")))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EngineError::Canonicalization("hash digest must be 32 bytes".to_string()))?;
        Ok(Self::from_digest(digest))
    }
}

impl serde::Serialize for Multihash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Multihash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Canonically encodes any serializable structure to bytes.
///
/// The value is first converted to a `ciborium::Value` tree (so nested maps
/// can be reordered), every map's entries are sorted by the canonical byte
/// encoding of their key, and the result is re-serialized to CBOR bytes.
pub fn canonical_encode<T: Serialize>(value: &T) -> Result<Vec<u8>, EngineError> {
    let mut tree: ciborium::Value = ciborium::Value::serialized(value)
        .map_err(|e| EngineError::Canonicalization(e.to_string()))?;
    canonicalize_tree(&mut tree)?;
    let mut bytes = Vec::new();
    ciborium::into_writer(&tree, &mut bytes)?;
    Ok(bytes)
}

/// Hashes the canonical encoding of `value` in one step.
pub fn hash_of<T: Serialize>(value: &T) -> Result<Multihash, EngineError> {
    let bytes = canonical_encode(value)?;
    Ok(Multihash::of_bytes(&bytes))
}

/// Hashes bytes that are already in their canonical form (e.g. a payload
/// whose data type defines its own canonical encoder).
pub fn hash_of_canonical_bytes(bytes: &[u8]) -> Multihash {
    Multihash::of_bytes(bytes)
}

fn canonicalize_tree(value: &mut ciborium::Value) -> Result<(), EngineError> {
    match value {
        ciborium::Value::Map(entries) => {
            for (_, v) in entries.iter_mut() {
                canonicalize_tree(v)?;
            }
            let mut encoded: Vec<(Vec<u8>, (ciborium::Value, ciborium::Value))> = Vec::with_capacity(entries.len());
            for (k, v) in entries.drain(..) {
                let mut key_bytes = Vec::new();
                ciborium::into_writer(&k, &mut key_bytes)?;
                encoded.push((key_bytes, (k, v)));
            }
            encoded.sort_by(|a, b| a.0.cmp(&b.0));
            *entries = encoded.into_iter().map(|(_, kv)| kv).collect();
            Ok(())
        }
        ciborium::Value::Array(items) => {
            for item in items.iter_mut() {
                canonicalize_tree(item)?;
            }
            Ok(())
        }
        ciborium::Value::Tag(_, inner) => canonicalize_tree(inner),
        _ => Ok(()),
    }
}

/// Canonicalizes an IEEE-754 double into its big-endian byte representation,
/// for data types whose payload includes floats and must therefore define a
/// bit-exact encoding (spec Open Question (a)).
pub fn canonical_float_bytes(value: f64) -> [u8; 8] {
    value.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn hash_determinism_equal_structures_equal_hash() {
        let mut a = BTreeMap::new();
        a.insert("b".to_string(), 2);
        a.insert("a".to_string(), 1);

        let mut b = BTreeMap::new();
        b.insert("a".to_string(), 1);
        b.insert("b".to_string(), 2);

        assert_eq!(hash_of(&a).unwrap(), hash_of(&b).unwrap());
    }

    #[test]
    fn hash_changes_with_content() {
        let a = serde_json::json!({"x": 1});
        let b = serde_json::json!({"x": 2});
        assert_ne!(hash_of(&a).unwrap(), hash_of(&b).unwrap());
    }

    #[test]
    fn multihash_round_trips_through_display() {
        let h = Multihash::of_bytes(b"hello world");
        let s = h.to_string();
        let parsed: Multihash = s.parse().unwrap();
        assert_eq!(h, parsed);
        assert!(s.starts_with("sha256:"));
    }

    #[test]
    fn map_key_order_does_not_affect_nested_hash() {
        let nested_a = serde_json::json!({"outer": {"z": 1, "a": 2}});
        let nested_b = serde_json::json!({"outer": {"a": 2, "z": 1}});
        assert_eq!(hash_of(&nested_a).unwrap(), hash_of(&nested_b).unwrap());
    }
}
