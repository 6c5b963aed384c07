// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Job Runner
//!
//! The cache-then-execute core shared by [`crate::application::context::EngineContext::run_job`]
//! and [`crate::application::controller::PipelineController`] (§4.F
//! "Retrieval policy"): compute the job hash, consult the job repository,
//! and either reconstruct the cached outputs or resolve the module and run
//! it through a [`Processor`].
//!
//! ## Cache retention policy
//!
//! Only two outcomes are ever recorded: `Completed` and the module's own
//! `ModuleFailure` (recorded as `Failed`, so a deterministic business
//! rejection is never silently retried). A crash, a timeout, or a
//! cancellation never writes a job record - §5 says as much for timeouts
//! explicitly ("no job record is written"), and a crash or a
//! not-yet-started cancellation are both non-deterministic with respect to
//! the module's own contract, so the next submission gets a fair retry
//! rather than a permanent negative cache entry.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use flowforge_bootstrap::CancellationToken;
use flowforge_domain::entities::job_record::{compute_inputs_hash, compute_job_hash};
use flowforge_domain::entities::{JobMetrics, JobRecord, JobStatus, Manifest, Value};
use flowforge_domain::error::EngineError;
use flowforge_domain::repositories::{JobRepository, ValueStore};
use flowforge_domain::services::module_contract::{ModuleResolver, ValueMap};
use flowforge_domain::services::value_registry::ValueRegistry;
use flowforge_domain::value_objects::{JobHash, StepId, ValueHash};

use crate::infrastructure::metrics::EngineMetrics;
use crate::infrastructure::processor::{Processor, StepExecution};

use super::controller::JobOutcome;

pub struct JobRunner {
    module_resolver: Arc<dyn ModuleResolver>,
    value_registry: Arc<ValueRegistry>,
    value_store: Arc<dyn ValueStore>,
    job_store: Arc<dyn JobRepository>,
    processor: Arc<dyn Processor>,
    metrics: Arc<EngineMetrics>,
}

impl JobRunner {
    pub fn new(
        module_resolver: Arc<dyn ModuleResolver>,
        value_registry: Arc<ValueRegistry>,
        value_store: Arc<dyn ValueStore>,
        job_store: Arc<dyn JobRepository>,
        processor: Arc<dyn Processor>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self { module_resolver, value_registry, value_store, job_store, processor, metrics }
    }

    pub fn value_registry(&self) -> &Arc<ValueRegistry> {
        &self.value_registry
    }

    /// A step id used for standalone job submissions that are not part of
    /// a compiled pipeline - there is no step to name, so every such
    /// submission reports under the same label.
    pub fn adhoc_step_id() -> StepId {
        StepId::new("adhoc").expect("\"adhoc\" satisfies the step id pattern")
    }

    pub async fn run(
        &self,
        manifest: Manifest,
        inputs: ValueMap,
        comment: String,
        timeout: Duration,
        cancellation: CancellationToken,
        step_id: StepId,
    ) -> Result<JobOutcome, EngineError> {
        let manifest_hash = manifest.manifest_hash()?;
        let input_value_hashes: BTreeMap<String, ValueHash> = inputs.iter().map(|(field, value)| (field.clone(), value.value_hash())).collect();
        let inputs_hash = compute_inputs_hash(&input_value_hashes)?;
        let job_hash = compute_job_hash(manifest_hash, inputs_hash)?;

        if let Some(record) = self.job_store.lookup_job(job_hash).await? {
            match &record.status {
                JobStatus::Completed => {
                    let outputs = self.reconstruct_outputs(job_hash, &record).await?;
                    self.metrics.record_cache_hit();
                    return Ok(JobOutcome { job_hash, record, outputs, from_cache: true });
                }
                JobStatus::Failed { reason } => {
                    self.metrics.record_cache_hit();
                    return Err(EngineError::ModuleFailure { reason: reason.clone(), field: None });
                }
                JobStatus::Cancelled => {
                    // A cancelled job never ran its module; fall through and
                    // give this submission a fresh attempt.
                }
            }
        }

        let module = self.module_resolver.resolve(&manifest).await?;
        let started_at = Utc::now();
        let started = Instant::now();
        let execution = StepExecution { job_hash, step_id, module, inputs, timeout };

        match self.processor.run_step(execution, cancellation).await {
            Ok(outputs) => {
                for value in outputs.values() {
                    self.value_store.write_value(value).await?;
                }

                let metrics = JobMetrics { duration_ms: started.elapsed().as_millis() as u64, peak_memory_bytes: None };
                let record = JobRecord::new(
                    manifest_hash,
                    input_value_hashes,
                    outputs.iter().map(|(field, value)| (field.clone(), value.value_hash())).collect(),
                    started_at,
                    Utc::now(),
                    comment,
                    JobStatus::Completed,
                    metrics,
                )?;
                self.job_store.record_job(record.clone()).await?;
                self.metrics.record_completed(started.elapsed().as_secs_f64());

                let deduped_outputs: ValueMap = outputs
                    .into_iter()
                    .map(|(field, value)| (field, (*self.register_or_reuse(value)).clone()))
                    .collect();

                Ok(JobOutcome { job_hash, record, outputs: deduped_outputs, from_cache: false })
            }
            Err(EngineError::ModuleFailure { reason, field }) => {
                let metrics = JobMetrics { duration_ms: started.elapsed().as_millis() as u64, peak_memory_bytes: None };
                let record = JobRecord::new(
                    manifest_hash,
                    input_value_hashes,
                    BTreeMap::new(),
                    started_at,
                    Utc::now(),
                    String::new(),
                    JobStatus::Failed { reason: reason.clone() },
                    metrics,
                )?;
                self.job_store.record_job(record).await?;
                self.metrics.record_failed();
                Err(EngineError::ModuleFailure { reason, field })
            }
            Err(EngineError::Cancelled(reason)) => {
                self.metrics.record_cancelled();
                Err(EngineError::Cancelled(reason))
            }
            Err(other) => {
                self.metrics.record_failed();
                Err(other)
            }
        }
    }

    /// Deduplicates a module's freshly-constructed output against whatever
    /// is already registered under the same value hash, preserving
    /// referential id stability across repeated runs (§4.C).
    fn register_or_reuse(&self, value: Value) -> Arc<Value> {
        if let Ok(existing) = self.value_registry.get_by_hash(value.value_hash()) {
            return existing;
        }
        self.value_registry.adopt(value)
    }

    /// Rebuilds a completed job's outputs from the archive, surfacing
    /// [`EngineError::JobOutputMissing`] rather than silently re-running
    /// the job if a recorded output's payload has gone missing (§4.F, S6).
    async fn reconstruct_outputs(&self, job_hash: JobHash, record: &JobRecord) -> Result<ValueMap, EngineError> {
        let mut outputs = ValueMap::new();
        for (field, value_hash) in &record.output_value_hashes {
            let value = match self.value_registry.get_by_hash(*value_hash) {
                Ok(value) => value,
                Err(_) => {
                    let loaded = self
                        .value_store
                        .load_value(*value_hash)
                        .await
                        .map_err(|_| EngineError::JobOutputMissing { job_hash: job_hash.to_string(), field: field.clone() })?;
                    self.value_registry.adopt(loaded)
                }
            };
            outputs.insert(field.clone(), (*value).clone());
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowforge_bootstrap::ShutdownCoordinator;
    use flowforge_domain::entities::{Value, ValueSchema};
    use flowforge_domain::repositories::ArchiveId;
    use flowforge_domain::services::module_contract::{Module, SchemaMap};
    use flowforge_domain::value_objects::{ValueOrigin, ValueStatus};
    use std::collections::BTreeMap as Map;

    use crate::infrastructure::archives::{FilesystemJobStore, FilesystemValueStore};
    use crate::infrastructure::processor::SynchronousProcessor;

    struct Doubler;

    #[async_trait]
    impl Module for Doubler {
        fn inputs_schema(&self) -> SchemaMap {
            Map::from([("n".to_string(), ValueSchema::new("string"))])
        }
        fn outputs_schema(&self) -> SchemaMap {
            Map::from([("n".to_string(), ValueSchema::new("string"))])
        }
        async fn process(&self, inputs: ValueMap) -> Result<ValueMap, EngineError> {
            let n: i64 = serde_json::from_slice(inputs["n"].payload_bytes()).unwrap();
            let out = Value::new(ValueSchema::new("string"), None, serde_json::to_vec(&(n * 2)).unwrap(), ValueOrigin::external("doubler"), ValueStatus::Set)?;
            Ok(Map::from([("n".to_string(), out)]))
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Module for AlwaysFails {
        fn inputs_schema(&self) -> SchemaMap {
            Map::new()
        }
        fn outputs_schema(&self) -> SchemaMap {
            Map::new()
        }
        async fn process(&self, _inputs: ValueMap) -> Result<ValueMap, EngineError> {
            Err(EngineError::ModuleFailure { reason: "always fails".to_string(), field: None })
        }
    }

    struct FixedResolver(&'static str);

    #[async_trait]
    impl ModuleResolver for FixedResolver {
        async fn resolve(&self, _manifest: &Manifest) -> Result<Box<dyn Module>, EngineError> {
            match self.0 {
                "doubler" => Ok(Box::new(Doubler)),
                _ => Ok(Box::new(AlwaysFails)),
            }
        }
    }

    async fn sample_runner(resolver: &'static str) -> (Arc<JobRunner>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let value_store = Arc::new(FilesystemValueStore::open(ArchiveId::new("data"), dir.path().join("data")).await.unwrap());
        let job_store = Arc::new(FilesystemJobStore::open(dir.path().join("jobs")).await.unwrap());
        let runner = Arc::new(JobRunner::new(
            Arc::new(FixedResolver(resolver)),
            Arc::new(ValueRegistry::new()),
            value_store,
            job_store,
            Arc::new(SynchronousProcessor::new()),
            Arc::new(EngineMetrics::new().unwrap()),
        ));
        (runner, dir)
    }

    fn int_input(n: i64) -> ValueMap {
        Map::from([("n".to_string(), Value::new(ValueSchema::new("string"), None, serde_json::to_vec(&n).unwrap(), ValueOrigin::external("test"), ValueStatus::Set).unwrap())])
    }

    #[tokio::test]
    async fn a_second_identical_submission_is_served_from_cache() {
        let (runner, _dir) = sample_runner("doubler").await;
        let token = ShutdownCoordinator::default().token();
        let manifest = Manifest::new("math.doubler");

        let first = runner.run(manifest.clone(), int_input(21), "first".to_string(), Duration::from_secs(5), token.clone(), JobRunner::adhoc_step_id()).await.unwrap();
        assert!(!first.from_cache);

        let second = runner.run(manifest, int_input(21), "second".to_string(), Duration::from_secs(5), token, JobRunner::adhoc_step_id()).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(first.job_hash, second.job_hash);
        assert_eq!(first.record.output_value_hashes, second.record.output_value_hashes);
    }

    #[tokio::test]
    async fn a_recorded_failure_is_returned_without_rerunning_the_module() {
        let (runner, _dir) = sample_runner("fails").await;
        let token = ShutdownCoordinator::default().token();
        let manifest = Manifest::new("math.fails");

        let first = runner.run(manifest.clone(), int_input(1), "first".to_string(), Duration::from_secs(5), token.clone(), JobRunner::adhoc_step_id()).await;
        assert!(matches!(first, Err(EngineError::ModuleFailure { .. })));

        let second = runner.run(manifest, int_input(1), "second".to_string(), Duration::from_secs(5), token, JobRunner::adhoc_step_id()).await;
        assert!(matches!(second, Err(EngineError::ModuleFailure { .. })));
    }

    #[tokio::test]
    async fn a_deleted_output_payload_surfaces_job_output_missing_instead_of_rerunning() {
        let (runner, dir) = sample_runner("doubler").await;
        let token = ShutdownCoordinator::default().token();
        let manifest = Manifest::new("math.doubler");

        let first = runner.run(manifest.clone(), int_input(7), "first".to_string(), Duration::from_secs(5), token.clone(), JobRunner::adhoc_step_id()).await.unwrap();

        // Evict every registered value so `reconstruct_outputs` is forced back
        // to the archive, then delete the archive's on-disk payload for it.
        let fresh_registry = ValueRegistry::new();
        let stale_runner = Arc::new(JobRunner::new(
            Arc::new(FixedResolver("doubler")),
            Arc::new(fresh_registry),
            Arc::new(FilesystemValueStore::open(ArchiveId::new("data"), dir.path().join("data")).await.unwrap()),
            Arc::new(FilesystemJobStore::open(dir.path().join("jobs")).await.unwrap()),
            Arc::new(SynchronousProcessor::new()),
            Arc::new(EngineMetrics::new().unwrap()),
        ));

        let data_dir = dir.path().join("data");
        let mut removed_one = false;
        for entry in walkdir::WalkDir::new(&data_dir).into_iter().filter_map(Result::ok) {
            if entry.file_type().is_file() {
                std::fs::remove_file(entry.path()).unwrap();
                removed_one = true;
            }
        }
        assert!(removed_one, "expected the doubler's output payload to exist on disk");

        let outcome = stale_runner.run(manifest, int_input(7), "second".to_string(), Duration::from_secs(5), token, JobRunner::adhoc_step_id()).await;
        assert!(matches!(outcome, Err(EngineError::JobOutputMissing { .. })), "expected JobOutputMissing, got {outcome:?}");
        let _ = first;
    }
}
