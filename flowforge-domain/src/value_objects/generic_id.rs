// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Generic ID Value Object
//!
//! A type-safe, ULID-backed identifier shared by every entity that needs a
//! time-ordered, globally-unique id (pipelines, steps). Phantom types keep
//! `PipelineId` and `StepId` from being mixed up at compile time, at zero
//! runtime cost.
//!
//! `Value` identifiers are a separate, UUID-backed type (see
//! `value_id.rs`) because the spec calls that out explicitly; everything
//! else uses this ULID base for its natural chronological ordering.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use ulid::Ulid;

use crate::error::EngineError;

/// Per-category validation hook for [`GenericId`].
pub trait IdCategory {
    fn category_name() -> &'static str;

    fn validate_id(ulid: &Ulid) -> Result<(), EngineError> {
        if *ulid == Ulid::nil() {
            return Err(EngineError::InvalidConfiguration(format!(
                "{} id cannot be nil",
                Self::category_name()
            )));
        }
        Ok(())
    }
}

/// A ULID wrapped in a phantom-typed newtype for compile-time category safety.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct GenericId<T: IdCategory> {
    value: Ulid,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: IdCategory> Serialize for GenericId<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.value.to_string().serialize(serializer)
    }
}

impl<'de, T: IdCategory> Deserialize<'de> for GenericId<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ulid = Ulid::from_string(&s).map_err(|e| serde::de::Error::custom(e.to_string()))?;
        Ok(Self { value: ulid, _phantom: std::marker::PhantomData })
    }
}

impl<T: IdCategory> GenericId<T> {
    pub fn new() -> Self {
        Self { value: Ulid::new(), _phantom: std::marker::PhantomData }
    }

    pub fn from_ulid(ulid: Ulid) -> Result<Self, EngineError> {
        T::validate_id(&ulid)?;
        Ok(Self { value: ulid, _phantom: std::marker::PhantomData })
    }

    pub fn from_string(s: &str) -> Result<Self, EngineError> {
        let ulid = Ulid::from_str(s)
            .map_err(|e| EngineError::InvalidConfiguration(format!("invalid id format: {e}")))?;
        Self::from_ulid(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.value
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.value.timestamp_ms()
    }

    pub fn category(&self) -> &'static str {
        T::category_name()
    }
}

impl<T: IdCategory> Default for GenericId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IdCategory> Display for GenericId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T: IdCategory> Hash for GenericId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: IdCategory> FromStr for GenericId<T> {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}
