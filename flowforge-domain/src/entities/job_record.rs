// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Job Record Entity
//!
//! The memoization unit of the engine. A job hash is the content-address of
//! a manifest paired with its fully-resolved inputs; a recorded job with a
//! matching hash is returned from the cache instead of re-executed (§4.F).
//! Job records are immutable once stored.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::hashing;
use crate::value_objects::{InputsHash, JobHash, ManifestHash, ValueHash};

/// Runtime metrics recorded alongside a completed job, for observability
/// rather than correctness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetrics {
    pub duration_ms: u64,
    pub peak_memory_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobStatus {
    Completed,
    Failed { reason: String },
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_hash: JobHash,
    pub manifest_hash: ManifestHash,
    pub inputs_hash: InputsHash,
    pub input_value_hashes: BTreeMap<String, ValueHash>,
    pub output_value_hashes: BTreeMap<String, ValueHash>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub comment: String,
    pub status: JobStatus,
    pub metrics: JobMetrics,
}

/// `inputs_hash(inputs) = hash(canonical_encode(sorted_map(field -> value_hash)))`.
pub fn compute_inputs_hash(input_value_hashes: &BTreeMap<String, ValueHash>) -> Result<InputsHash, EngineError> {
    Ok(hashing::hash_of(input_value_hashes)?.into())
}

/// `job_hash(manifest, inputs) = hash(canonical_encode({manifest_hash, inputs_hash}))`.
pub fn compute_job_hash(manifest_hash: ManifestHash, inputs_hash: InputsHash) -> Result<JobHash, EngineError> {
    #[derive(Serialize)]
    struct JobHashInput {
        manifest_hash: ManifestHash,
        inputs_hash: InputsHash,
    }
    Ok(hashing::hash_of(&JobHashInput { manifest_hash, inputs_hash })?.into())
}

impl JobRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manifest_hash: ManifestHash,
        input_value_hashes: BTreeMap<String, ValueHash>,
        output_value_hashes: BTreeMap<String, ValueHash>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        comment: impl Into<String>,
        status: JobStatus,
        metrics: JobMetrics,
    ) -> Result<Self, EngineError> {
        let inputs_hash = compute_inputs_hash(&input_value_hashes)?;
        let job_hash = compute_job_hash(manifest_hash, inputs_hash)?;
        Ok(Self {
            job_hash,
            manifest_hash,
            inputs_hash,
            input_value_hashes,
            output_value_hashes,
            started_at,
            finished_at,
            comment: comment.into(),
            status,
            metrics,
        })
    }

    pub fn is_successful(&self) -> bool {
        matches!(self.status, JobStatus::Completed)
    }
}
