// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Value Lifecycle Status
//!
//! A value's relationship to "having a payload". `Set` values carry data;
//! `NotSet` and `Default` distinguish an input slot nobody filled in from one
//! that fell back to a schema-declared default; `None` represents a value
//! that is explicitly and permanently absent (e.g. an optional module output
//! that a given invocation did not produce).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum ValueStatus {
    Set,
    NotSet,
    Default,
    None,
}

impl ValueStatus {
    /// Whether a slot in this status carries a usable value. `None` is a
    /// deliberate, schema-aware absence and is validated against the field's
    /// `optional` flag elsewhere, not treated as generically ready here.
    pub fn is_ready(&self) -> bool {
        matches!(self, ValueStatus::Set | ValueStatus::Default)
    }
}

impl std::fmt::Display for ValueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValueStatus::Set => "set",
            ValueStatus::NotSet => "not_set",
            ValueStatus::Default => "default",
            ValueStatus::None => "none",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_set_and_default_are_generically_ready() {
        assert!(!ValueStatus::NotSet.is_ready());
        assert!(!ValueStatus::None.is_ready());
        assert!(ValueStatus::Set.is_ready());
        assert!(ValueStatus::Default.is_ready());
    }
}
