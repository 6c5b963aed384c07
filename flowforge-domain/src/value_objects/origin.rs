// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Value Origin
//!
//! A value's lineage pointer: either supplied directly by a caller
//! (`External`), or produced by a recorded job (`Job`). Stored alongside
//! every persisted value so provenance can be walked backwards from any
//! value to the job graph that produced it.

use serde::{Deserialize, Serialize};

use crate::value_objects::hashes::JobHash;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum ValueOrigin {
    /// Supplied by a caller rather than produced by a job. The label is a
    /// free-form note (e.g. the pipeline input field it was assigned to).
    External { label: String },

    /// Produced by a recorded job's named output field.
    Job { job_hash: JobHash, output_field: String },
}

impl ValueOrigin {
    pub fn external(label: impl Into<String>) -> Self {
        ValueOrigin::External { label: label.into() }
    }

    pub fn job(job_hash: JobHash, output_field: impl Into<String>) -> Self {
        ValueOrigin::Job { job_hash, output_field: output_field.into() }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, ValueOrigin::External { .. })
    }
}
