// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Job Repository Port
//!
//! Backs the job cache's retrieval policy (§4.F): on submission the caller
//! computes the job hash and calls `lookup_job` before running anything; a
//! hit skips execution entirely. `record_job` is called once, after a
//! successful run, and job records are never updated afterwards.

use async_trait::async_trait;

use crate::entities::JobRecord;
use crate::error::EngineError;
use crate::value_objects::JobHash;

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn lookup_job(&self, job_hash: JobHash) -> Result<Option<JobRecord>, EngineError>;
    async fn record_job(&self, record: JobRecord) -> Result<(), EngineError>;

    /// Every recorded job, for `export_archive` (§4.K) and property 8's
    /// round-trip check. Unordered - callers that need a stable order sort
    /// by `job_hash` themselves.
    async fn iter_jobs(&self) -> Result<Vec<JobRecord>, EngineError>;
}
