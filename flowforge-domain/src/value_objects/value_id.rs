// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Value Id Value Object
//!
//! A value's stable identifier. Unlike [`crate::value_objects::generic_id`]
//! ids, this is UUID-backed, matching the wire format's "value-ids are UUIDs
//! written in canonical byte form" requirement. A value id identifies a
//! registry entry across its lifetime; it is distinct from the value hash,
//! which identifies its content and is shared by every duplicate.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ValueId(Uuid);

impl ValueId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn parse(s: &str) -> Result<Self, EngineError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| EngineError::InvalidConfiguration(format!("invalid value id: {e}")))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ValueId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let id = ValueId::new();
        assert_eq!(ValueId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn new_ids_are_unique() {
        assert_ne!(ValueId::new(), ValueId::new());
    }
}
