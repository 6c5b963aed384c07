// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! A single hierarchical error type for the engine, in the spirit of the
//! original pipeline's `PipelineError`: one variant per failure category
//! named in the error handling design, each carrying enough context for a
//! terminal message to include the job hash and step id when known.
//!
//! ## Recoverability
//!
//! A handful of variants are considered transient and safe to retry
//! (`ArchiveLocked`, `TimeoutError`); the rest indicate a permanent failure
//! requiring caller intervention.

use thiserror::Error;

/// The engine's single error type.
///
/// Every terminal error should be constructed (or wrapped) with enough
/// context - job hash, step id - to satisfy the "user-visible failure"
/// requirement that every terminal error names the job and step it
/// belongs to, when one exists.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("canonicalization failed: {0}")]
    Canonicalization(String),

    #[error("type validation failed at {path}: {reason}")]
    TypeValidation { path: String, reason: String },

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("unknown value: {0}")]
    UnknownValue(String),

    #[error("duplicate type registration: {0}")]
    DuplicateType(String),

    #[error("opaque payload cannot be persisted: {0}")]
    OpaqueNotPersistable(String),

    #[error("module failure in field {field:?}: {reason}")]
    ModuleFailure { reason: String, field: Option<String> },

    #[error("module crashed: {0}")]
    ModuleCrash(String),

    #[error("pipeline contains a cycle: {0}")]
    PipelineCycle(String),

    #[error("step {step_id} is not ready: {reason}")]
    StepNotReady { step_id: String, reason: String },

    #[error("job {job_hash} timed out after {elapsed_ms}ms")]
    JobTimeout { job_hash: String, elapsed_ms: u64 },

    #[error("job {job_hash} output missing: {field}")]
    JobOutputMissing { job_hash: String, field: String },

    #[error("archive is incompatible: {0}")]
    IncompatibleArchive(String),

    #[error("archive is locked by another writer")]
    ArchiveLocked,

    #[error("unknown alias: {0}")]
    UnknownAlias(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Attaches job/step context to an error's display, per the error
    /// handling design's "user-visible failure" requirement.
    ///
    /// This is a convenience used by the processor and controller; it does
    /// not change the error's variant, only wraps a caller-facing message.
    pub fn with_job_context(self, job_hash: Option<&str>, step_id: Option<&str>) -> String {
        let mut msg = self.to_string();
        if let Some(job) = job_hash {
            msg.push_str(&format!(" [job={job}]"));
        }
        if let Some(step) = step_id {
            msg.push_str(&format!(" [step={step}]"));
        }
        msg
    }

    /// Whether a caller may retry the operation that produced this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::ArchiveLocked | EngineError::JobTimeout { .. } | EngineError::Io(_)
        )
    }

    /// Coarse error category, used for metrics labels and logging.
    pub fn category(&self) -> &'static str {
        match self {
            EngineError::Canonicalization(_) => "canonicalization",
            EngineError::TypeValidation { .. } => "type_validation",
            EngineError::SchemaMismatch(_) => "schema",
            EngineError::UnknownValue(_) => "value",
            EngineError::DuplicateType(_) => "type_registry",
            EngineError::OpaqueNotPersistable(_) => "persistence",
            EngineError::ModuleFailure { .. } => "module_failure",
            EngineError::ModuleCrash(_) => "module_crash",
            EngineError::PipelineCycle(_) => "pipeline_structure",
            EngineError::StepNotReady { .. } => "pipeline_state",
            EngineError::JobTimeout { .. } => "timeout",
            EngineError::JobOutputMissing { .. } => "job_cache",
            EngineError::IncompatibleArchive(_) => "archive",
            EngineError::ArchiveLocked => "archive",
            EngineError::UnknownAlias(_) => "alias",
            EngineError::InvalidConfiguration(_) => "configuration",
            EngineError::ValidationError(_) => "validation",
            EngineError::Io(_) => "io",
            EngineError::Database(_) => "database",
            EngineError::Serialization(_) => "serialization",
            EngineError::Cancelled(_) => "cancellation",
            EngineError::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for EngineError {
    fn from(err: ciborium::de::Error<std::io::Error>) -> Self {
        EngineError::Canonicalization(err.to_string())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for EngineError {
    fn from(err: ciborium::ser::Error<std::io::Error>) -> Self {
        EngineError::Canonicalization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_errors_are_flagged() {
        assert!(EngineError::ArchiveLocked.is_recoverable());
        assert!(!EngineError::PipelineCycle("x".into()).is_recoverable());
    }

    #[test]
    fn job_context_is_appended() {
        let msg = EngineError::ModuleCrash("boom".into())
            .with_job_context(Some("sha256:abc"), Some("step-1"));
        assert!(msg.contains("job=sha256:abc"));
        assert!(msg.contains("step=step-1"));
    }
}
