// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Controller
//!
//! The orchestration half of §4.H: drives a compiled
//! [`PipelineStructure`]'s [`PipelineState`] stage by stage, dispatching
//! each stage's ready steps to a [`JobRunner`] and publishing the resulting
//! [`EngineEvent`]s. Grounded in the teacher's event-sourced pipeline
//! aggregate (`domain/aggregates/pipeline_aggregate.rs`'s load-mutate-emit
//! shape), generalized from file-processing events to slot-transition
//! events.
//!
//! A stage's ready steps are dispatched concurrently - they cannot observe
//! each other's outputs, only the stage below - and their outputs are
//! applied to [`PipelineState`] only once every step in the stage has
//! finished, so stage `n+1` never sees a partially-updated stage `n` (§5
//! "Ordering guarantees"). A step failure is recorded in full (so already
//! -succeeded siblings in the same stage keep their outputs) and aborts
//! further dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use flowforge_bootstrap::CancellationToken;
use flowforge_domain::aggregates::pipeline_state::PipelineState;
use flowforge_domain::aggregates::pipeline_structure::PipelineStructure;
use flowforge_domain::entities::JobRecord;
use flowforge_domain::error::EngineError;
use flowforge_domain::events::{EngineEvent, EngineObserver, EventBroadcaster};
use flowforge_domain::services::module_contract::ValueMap;
use flowforge_domain::value_objects::{JobHash, StageIndex, StepId, ValueId};

use super::job_runner::JobRunner;

/// Everything a controller needs to run one job to completion, independent
/// of which step in which pipeline it belongs to - shared with
/// [`crate::application::context::EngineContext::run_job`] so a standalone
/// job submission and a pipeline step use identical caching semantics.
pub struct JobOutcome {
    pub job_hash: JobHash,
    pub record: JobRecord,
    pub outputs: ValueMap,
    pub from_cache: bool,
}

/// Drives one running instance of a compiled pipeline. Borrows the
/// structure it was compiled from; a fresh `PipelineController` is created
/// per run rather than reused, since [`PipelineState`] has no reset.
pub struct PipelineController<'a> {
    structure: &'a PipelineStructure,
    state: PipelineState<'a>,
    job_runner: Arc<JobRunner>,
    events: EventBroadcaster,
    cancellation: CancellationToken,
    timeout: Duration,
}

impl<'a> PipelineController<'a> {
    pub fn new(
        structure: &'a PipelineStructure,
        job_runner: Arc<JobRunner>,
        cancellation: CancellationToken,
        timeout: Duration,
    ) -> Self {
        Self { structure, state: PipelineState::new(structure), job_runner, events: EventBroadcaster::new(), cancellation, timeout }
    }

    pub fn subscribe(&mut self, observer: Box<dyn EngineObserver>) {
        self.events.subscribe(observer);
    }

    pub fn step_is_ready(&self, step_id: &StepId) -> Result<bool, EngineError> {
        self.state.step_is_ready(step_id)
    }

    pub fn pipeline_is_finished(&self) -> bool {
        self.state.pipeline_is_finished()
    }

    pub fn pipeline_outputs(&self) -> BTreeMap<String, ValueId> {
        self.state.pipeline_outputs()
    }

    /// Binds pipeline-level inputs, publishing the resulting
    /// `PipelineInputsChanged`/`StepInputsChanged` events in one tick.
    pub fn set_pipeline_inputs(&mut self, mapping: BTreeMap<String, ValueId>) {
        for event in self.state.set_pipeline_inputs(mapping) {
            self.events.publish(event);
        }
    }

    /// Runs a single ready step to completion, publishing its lifecycle
    /// events and propagating its outputs to every downstream slot before
    /// returning. Fails with [`EngineError::StepNotReady`] without
    /// publishing anything if a required input is unset.
    pub async fn process_step(&mut self, step_id: &StepId, comment: impl Into<String>) -> Result<JobHash, EngineError> {
        self.state.require_step_ready(step_id)?;
        let outcome = self.dispatch_step(step_id, comment.into()).await?;
        let job_hash = outcome.job_hash;
        self.apply_outcome(step_id, outcome);
        Ok(job_hash)
    }

    /// Runs every step to completion, stage by stage, and returns the
    /// pipeline's output slots. A stage's ready steps are dispatched
    /// concurrently; their outputs are applied to the state - and the next
    /// stage dispatched - only once the whole stage has finished.
    pub async fn run_to_completion(&mut self, comment: impl Into<String> + Clone) -> Result<BTreeMap<String, ValueId>, EngineError> {
        let mut stage = StageIndex::FIRST;
        let max_stage = self.structure.max_stage();
        loop {
            let ready_steps: Vec<StepId> = self
                .structure
                .steps_at_stage(stage)
                .map(|step| step.step_id.clone())
                .filter(|step_id| self.state.step_is_ready(step_id).unwrap_or(false))
                .collect();

            let dispatches = ready_steps.iter().map(|step_id| self.dispatch_step(step_id, comment.clone().into()));
            let outcomes = futures::future::join_all(dispatches).await;

            for (step_id, outcome) in ready_steps.into_iter().zip(outcomes) {
                let outcome = outcome?;
                self.apply_outcome(&step_id, outcome);
            }

            if stage == max_stage {
                break;
            }
            stage = stage.next();
        }
        Ok(self.state.pipeline_outputs())
    }

    /// Resolves a step's inputs from its current slots and runs it through
    /// the shared job runner. Takes `&self` so a whole stage's steps can be
    /// dispatched concurrently without conflicting with each other; state
    /// mutation happens afterwards, in [`Self::apply_outcome`].
    async fn dispatch_step(&self, step_id: &StepId, comment: String) -> Result<JobOutcome, EngineError> {
        let step = self
            .structure
            .step(step_id)
            .ok_or_else(|| EngineError::StepNotReady { step_id: step_id.to_string(), reason: "unknown step".to_string() })?;

        let input_ids = self.state.step_inputs(step_id);
        let mut inputs = ValueMap::new();
        for (field, value_id) in input_ids {
            let value = self.job_runner.value_registry().get(value_id)?;
            inputs.insert(field, (*value).clone());
        }

        if self.cancellation.is_cancelled() {
            let job_hash = preview_job_hash(step, &inputs)?;
            self.events.publish(EngineEvent::JobCancelled { job_hash, step_id: step_id.clone() });
            return Err(EngineError::Cancelled(step_id.to_string()));
        }

        let job_hash = preview_job_hash(step, &inputs)?;
        self.events.publish(EngineEvent::JobStarted { job_hash, step_id: step_id.clone() });

        match self.job_runner.run(step.manifest.clone(), inputs, comment, self.timeout, self.cancellation.clone(), step_id.clone()).await {
            Ok(outcome) => {
                self.events.publish(EngineEvent::JobCompleted { job_hash: outcome.job_hash, step_id: step_id.clone() });
                Ok(outcome)
            }
            Err(EngineError::Cancelled(reason)) => {
                self.events.publish(EngineEvent::JobCancelled { job_hash, step_id: step_id.clone() });
                Err(EngineError::Cancelled(reason))
            }
            Err(err) => {
                self.events.publish(EngineEvent::JobFailed { job_hash, step_id: step_id.clone(), reason: err.to_string() });
                Err(err)
            }
        }
    }

    fn apply_outcome(&mut self, step_id: &StepId, outcome: JobOutcome) {
        let output_ids: BTreeMap<String, ValueId> = outcome.outputs.iter().map(|(field, value)| (field.clone(), value.id())).collect();
        for event in self.state.record_step_outputs(step_id, output_ids) {
            self.events.publish(event);
        }
    }
}

/// Computes the job hash a step's current inputs would resolve to, so
/// `JobStarted`/`JobCancelled` can name it even before (or without ever)
/// calling [`JobRunner::run`].
fn preview_job_hash(step: &flowforge_domain::aggregates::pipeline_structure::CompiledStep, inputs: &ValueMap) -> Result<JobHash, EngineError> {
    let input_value_hashes: BTreeMap<String, flowforge_domain::value_objects::ValueHash> =
        inputs.iter().map(|(field, value)| (field.clone(), value.value_hash())).collect();
    let inputs_hash = flowforge_domain::entities::job_record::compute_inputs_hash(&input_value_hashes)?;
    flowforge_domain::entities::job_record::compute_job_hash(step.manifest_hash, inputs_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowforge_bootstrap::ShutdownCoordinator;
    use flowforge_domain::aggregates::pipeline_structure::{InputLink, PipelineDeclaration, StepDeclaration};
    use flowforge_domain::entities::{Manifest, Value, ValueSchema};
    use flowforge_domain::repositories::ArchiveId;
    use flowforge_domain::services::module_contract::{Module, ModuleResolver, SchemaMap};
    use flowforge_domain::services::value_registry::ValueRegistry;
    use flowforge_domain::value_objects::{ValueOrigin, ValueStatus};
    use std::collections::BTreeMap as Map;

    use crate::infrastructure::archives::{FilesystemJobStore, FilesystemValueStore};
    use crate::infrastructure::processor::SynchronousProcessor;

    struct BooleanAnd;

    #[async_trait]
    impl Module for BooleanAnd {
        fn inputs_schema(&self) -> SchemaMap {
            Map::from([("a".to_string(), ValueSchema::new("boolean")), ("b".to_string(), ValueSchema::new("boolean"))])
        }
        fn outputs_schema(&self) -> SchemaMap {
            Map::from([("y".to_string(), ValueSchema::new("boolean"))])
        }
        async fn process(&self, inputs: ValueMap) -> Result<ValueMap, EngineError> {
            let a: bool = serde_json::from_slice(inputs["a"].payload_bytes()).unwrap();
            let b: bool = serde_json::from_slice(inputs["b"].payload_bytes()).unwrap();
            let y = Value::new(ValueSchema::new("boolean"), None, serde_json::to_vec(&(a && b)).unwrap(), ValueOrigin::external("and"), ValueStatus::Set)?;
            Ok(Map::from([("y".to_string(), y)]))
        }
    }

    struct BooleanNot;

    #[async_trait]
    impl Module for BooleanNot {
        fn inputs_schema(&self) -> SchemaMap {
            Map::from([("a".to_string(), ValueSchema::new("boolean"))])
        }
        fn outputs_schema(&self) -> SchemaMap {
            Map::from([("y".to_string(), ValueSchema::new("boolean"))])
        }
        async fn process(&self, inputs: ValueMap) -> Result<ValueMap, EngineError> {
            let a: bool = serde_json::from_slice(inputs["a"].payload_bytes()).unwrap();
            let y = Value::new(ValueSchema::new("boolean"), None, serde_json::to_vec(&!a).unwrap(), ValueOrigin::external("not"), ValueStatus::Set)?;
            Ok(Map::from([("y".to_string(), y)]))
        }
    }

    struct GateResolver;

    #[async_trait]
    impl ModuleResolver for GateResolver {
        async fn resolve(&self, manifest: &Manifest) -> Result<Box<dyn Module>, EngineError> {
            match manifest.module_type.as_str() {
                "logic.and" => Ok(Box::new(BooleanAnd)),
                "logic.not" => Ok(Box::new(BooleanNot)),
                other => Err(EngineError::InvalidConfiguration(format!("unknown module {other}"))),
            }
        }
    }

    fn nand_declaration() -> PipelineDeclaration {
        let and_step = StepDeclaration {
            step_id: StepId::new("and").unwrap(),
            manifest: Manifest::new("logic.and"),
            input_links: Map::from([
                ("a".to_string(), InputLink::PipelineInput("a".to_string())),
                ("b".to_string(), InputLink::PipelineInput("b".to_string())),
            ]),
        };
        let not_step = StepDeclaration {
            step_id: StepId::new("not").unwrap(),
            manifest: Manifest::new("logic.not"),
            input_links: Map::from([(
                "a".to_string(),
                InputLink::StepOutput { step_id: StepId::new("and").unwrap(), output_field: "y".to_string() },
            )]),
        };
        PipelineDeclaration {
            pipeline_name: "nand".to_string(),
            doc: String::new(),
            steps: vec![and_step, not_step],
            output_aliases: Map::from([("y".to_string(), (StepId::new("not").unwrap(), "y".to_string()))]),
            literal_inputs: Map::new(),
        }
    }

    async fn sample_runner() -> Arc<JobRunner> {
        let dir = tempfile::tempdir().unwrap();
        let value_store = Arc::new(FilesystemValueStore::open(ArchiveId::new("data"), dir.path().join("data")).await.unwrap());
        let job_store = Arc::new(FilesystemJobStore::open(dir.path().join("jobs")).await.unwrap());
        Arc::new(JobRunner::new(
            Arc::new(GateResolver),
            Arc::new(ValueRegistry::new()),
            value_store,
            job_store,
            Arc::new(SynchronousProcessor::new()),
            Arc::new(crate::infrastructure::metrics::EngineMetrics::new().unwrap()),
        ))
    }

    #[tokio::test]
    async fn runs_the_nand_pipeline_end_to_end() {
        let structure = PipelineStructure::compile(nand_declaration(), &GateResolver).await.unwrap();
        let job_runner = sample_runner().await;
        let token = ShutdownCoordinator::default().token();
        let mut controller = PipelineController::new(&structure, job_runner.clone(), token, Duration::from_secs(5));

        let register_bool = |b: bool| {
            job_runner
                .value_registry()
                .register_value(ValueSchema::new("boolean"), None, serde_json::to_vec(&b).unwrap(), ValueOrigin::external("input"))
                .unwrap()
                .id()
        };

        controller.set_pipeline_inputs(Map::from([("a".to_string(), register_bool(true)), ("b".to_string(), register_bool(true))]));
        let outputs = controller.run_to_completion("nand test run").await.unwrap();

        let y_id = outputs["y"];
        let y = job_runner.value_registry().get(y_id).unwrap();
        let y_value: bool = serde_json::from_slice(y.payload_bytes()).unwrap();
        assert!(!y_value, "true AND true, then NOT, should be false");
    }

    #[tokio::test]
    async fn rerunning_with_different_inputs_changes_the_output() {
        let structure = PipelineStructure::compile(nand_declaration(), &GateResolver).await.unwrap();
        let job_runner = sample_runner().await;
        let token = ShutdownCoordinator::default().token();
        let mut controller = PipelineController::new(&structure, job_runner.clone(), token, Duration::from_secs(5));

        let register_bool = |b: bool| {
            job_runner
                .value_registry()
                .register_value(ValueSchema::new("boolean"), None, serde_json::to_vec(&b).unwrap(), ValueOrigin::external("input"))
                .unwrap()
                .id()
        };

        controller.set_pipeline_inputs(Map::from([("a".to_string(), register_bool(true)), ("b".to_string(), register_bool(false))]));
        let outputs = controller.run_to_completion("second run").await.unwrap();

        let y = job_runner.value_registry().get(outputs["y"]).unwrap();
        let y_value: bool = serde_json::from_slice(y.payload_bytes()).unwrap();
        assert!(y_value, "true AND false, then NOT, should be true");
    }

    struct TableFromCsv;

    #[async_trait]
    impl Module for TableFromCsv {
        fn inputs_schema(&self) -> SchemaMap {
            Map::from([("csv_bytes".to_string(), ValueSchema::new("bytes"))])
        }
        fn outputs_schema(&self) -> SchemaMap {
            Map::from([("table".to_string(), ValueSchema::new("dict"))])
        }
        async fn process(&self, inputs: ValueMap) -> Result<ValueMap, EngineError> {
            let csv_text = String::from_utf8_lossy(inputs["csv_bytes"].payload_bytes()).into_owned();
            let row_count = csv_text.lines().skip(1).filter(|line| !line.is_empty()).count();
            let table = Value::new(
                ValueSchema::new("dict"),
                None,
                serde_json::to_vec(&serde_json::json!({ "csv": csv_text })).unwrap(),
                ValueOrigin::external("table.from_csv"),
                ValueStatus::Set,
            )?
            .with_metadata_attachment("row_count", serde_json::json!(row_count));
            Ok(Map::from([("table".to_string(), table)]))
        }
    }

    struct QueryTable;

    #[async_trait]
    impl Module for QueryTable {
        fn inputs_schema(&self) -> SchemaMap {
            Map::from([("table".to_string(), ValueSchema::new("dict")), ("query".to_string(), ValueSchema::new("string"))])
        }
        fn outputs_schema(&self) -> SchemaMap {
            Map::from([("query_result".to_string(), ValueSchema::new("string"))])
        }
        async fn process(&self, inputs: ValueMap) -> Result<ValueMap, EngineError> {
            let row_count = inputs["table"].metadata().get("row_count").cloned().unwrap_or(serde_json::json!(0));
            let result = Value::new(
                ValueSchema::new("string"),
                None,
                serde_json::to_vec(&format!("{} rows matched", row_count)).unwrap(),
                ValueOrigin::external("table.query"),
                ValueStatus::Set,
            )?;
            Ok(Map::from([("query_result".to_string(), result)]))
        }
    }

    struct TableResolver;

    #[async_trait]
    impl ModuleResolver for TableResolver {
        async fn resolve(&self, manifest: &Manifest) -> Result<Box<dyn Module>, EngineError> {
            match manifest.module_type.as_str() {
                "table.from_csv" => Ok(Box::new(TableFromCsv)),
                "table.query.graphql" => Ok(Box::new(QueryTable)),
                other => Err(EngineError::InvalidConfiguration(format!("unknown module {other}"))),
            }
        }
    }

    fn table_query_declaration() -> PipelineDeclaration {
        let from_csv = StepDeclaration {
            step_id: StepId::new("load").unwrap(),
            manifest: Manifest::new("table.from_csv"),
            input_links: Map::from([("csv_bytes".to_string(), InputLink::PipelineInput("csv_bytes".to_string()))]),
        };
        let query = StepDeclaration {
            step_id: StepId::new("query").unwrap(),
            manifest: Manifest::new("table.query.graphql"),
            input_links: Map::from([
                ("table".to_string(), InputLink::StepOutput { step_id: StepId::new("load").unwrap(), output_field: "table".to_string() }),
                ("query".to_string(), InputLink::PipelineInput("query".to_string())),
            ]),
        };
        PipelineDeclaration {
            pipeline_name: "table_from_csv_and_query".to_string(),
            doc: String::new(),
            steps: vec![from_csv, query],
            output_aliases: Map::from([("query_result".to_string(), (StepId::new("query").unwrap(), "query_result".to_string()))]),
            literal_inputs: Map::new(),
        }
    }

    #[tokio::test]
    async fn resubmitting_the_byte_identical_csv_reuses_the_cached_table() {
        let structure = PipelineStructure::compile(table_query_declaration(), &TableResolver).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let value_store = Arc::new(FilesystemValueStore::open(ArchiveId::new("data"), dir.path().join("data")).await.unwrap());
        let job_store = Arc::new(FilesystemJobStore::open(dir.path().join("jobs")).await.unwrap());
        let job_runner = Arc::new(JobRunner::new(
            Arc::new(TableResolver),
            Arc::new(ValueRegistry::new()),
            value_store,
            job_store,
            Arc::new(SynchronousProcessor::new()),
            Arc::new(crate::infrastructure::metrics::EngineMetrics::new().unwrap()),
        ));

        let csv_bytes = b"name,year\nZeitschrift,1902\nAnnalen,1902\n".to_vec();
        let register_input = |bytes: Vec<u8>, schema: &str| job_runner.value_registry().register_value(ValueSchema::new(schema), None, bytes, ValueOrigin::external("input")).unwrap().id();

        let query_text = serde_json::to_vec(&"find German journals".to_string()).unwrap();

        let token = ShutdownCoordinator::default().token();
        let mut first_run = PipelineController::new(&structure, job_runner.clone(), token.clone(), Duration::from_secs(5));
        first_run.set_pipeline_inputs(Map::from([
            ("csv_bytes".to_string(), register_input(csv_bytes.clone(), "bytes")),
            ("query".to_string(), register_input(query_text.clone(), "string")),
        ]));
        let load_job_hash = first_run.process_step(&StepId::new("load").unwrap(), "S2 run 1").await.unwrap();
        first_run.process_step(&StepId::new("query").unwrap(), "S2 run 1").await.unwrap();

        // Resubmit the byte-identical csv directly through the job runner
        // (bypassing the controller's state, which only short-circuits at the
        // pipeline level) to confirm the *job* hash itself is cache-served.
        let csv_input = Map::from([("csv_bytes".to_string(), (*job_runner.value_registry().get(register_input(csv_bytes, "bytes")).unwrap()).clone())]);
        let replayed = job_runner
            .run(Manifest::new("table.from_csv"), csv_input, "S2 run 2".to_string(), Duration::from_secs(5), token, StepId::new("load").unwrap())
            .await
            .unwrap();

        assert_eq!(load_job_hash, replayed.job_hash, "resubmitting byte-identical csv must hash to the same job");
        assert!(replayed.from_cache, "second submission of the same csv bytes must be served from the job cache");
    }
}
