// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Step Id Value Object
//!
//! A step's identifier as given in the pipeline declaration - a short
//! human-chosen name, not a generated id, since the same declaration must
//! compile to the same [`crate::aggregates::pipeline_structure::PipelineStructure`]
//! on every run. Used both as a map key and in link references such as
//! `step_id.output_field`.

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::EngineError;

static STEP_ID_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Za-z][A-Za-z0-9_\-]*$").unwrap());

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct StepId(String);

impl StepId {
    pub fn new(name: impl Into<String>) -> Result<Self, EngineError> {
        let name = name.into();
        if !STEP_ID_PATTERN.is_match(&name) {
            return Err(EngineError::InvalidConfiguration(format!(
                "step id {name:?} must start with a letter and contain only letters, digits, '_' or '-'"
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for StepId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_identifier_like_names() {
        assert!(StepId::new("nand_gate").is_ok());
        assert!(StepId::new("step-1").is_ok());
    }

    #[test]
    fn rejects_empty_and_leading_digit() {
        assert!(StepId::new("").is_err());
        assert!(StepId::new("1step").is_err());
    }

    #[test]
    fn rejects_dotted_names_reserved_for_link_references() {
        assert!(StepId::new("step.output").is_err());
    }
}
