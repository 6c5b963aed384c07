// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Context Facade
//!
//! `EngineContext` is §4.K's binding point: one of each store (data, job,
//! alias, metadata, workflow) plus their read-only archives, an operation
//! registry, a module resolver standing in for the module type registry,
//! and a data-type registry, constructed once per process from an
//! [`EngineConfig`] and thereafter immutable except through the stores it
//! owns. Everything the CLI surface (an explicit non-goal of this crate)
//! would drive is exposed here instead: `run_job`, `queue_job`,
//! `get_value`, `store_value`, `resolve_alias`, `list_aliases`,
//! `get_job_record`, `export_archive`, `import_archive`, `list_pipelines`,
//! `get_pipeline`, `retrieve_archive_info`.
//!
//! Grounded in the teacher's `PipelineEnvironment`/service-locator
//! construction (`infrastructure/config.rs` + the binary's composition
//! root), generalized from one repository pair to five.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use flowforge_bootstrap::ShutdownCoordinator;
use flowforge_domain::aggregates::pipeline_structure::{PipelineDeclaration, PipelineStructure};
use flowforge_domain::entities::{DataTypeRegistry, JobRecord, Manifest, Value, ValueSchema};
use flowforge_domain::error::EngineError;
use flowforge_domain::repositories::{
    AliasHistoryEntry, AliasRepository, ArchiveId, JobRepository, MetadataRepository, PipelineRepository, ValueStore,
};
use flowforge_domain::services::module_contract::{ModuleResolver, ValueMap};
use flowforge_domain::services::operation_registry::OperationRegistry;
use flowforge_domain::services::value_registry::{ValueReference, ValueRegistry};
use flowforge_domain::value_objects::{JobHash, ValueId, ValueOrigin};

use crate::infrastructure::archives::{
    FilesystemAliasStore, FilesystemJobStore, FilesystemMetadataStore, FilesystemPipelineStore, FilesystemValueStore, SqliteAliasStore,
    SqliteJobStore, SqliteMetadataStore, SqlitePipelineStore, SqliteValueStore,
};
use crate::infrastructure::config::{ArchiveBackend, EngineConfig, ProcessorKind};
use crate::infrastructure::metrics::EngineMetrics;
use crate::infrastructure::processor::{ParallelProcessor, Processor, SynchronousProcessor};

use super::controller::{JobOutcome, PipelineController};
use super::job_runner::JobRunner;

/// A snapshot of archive occupancy, for the `archive info` surface (§4.K,
/// §6 "CLI surface").
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveInfo {
    pub archive_backend: ArchiveBackend,
    pub value_count: usize,
    pub job_count: usize,
    pub alias_count: usize,
}

/// Everything `export_archive`/`import_archive` move between contexts:
/// every stored value, every recorded job, and the current alias→value-id
/// mapping (property 8's round-trip set). Alias *history* prior to export
/// is not carried over - the imported context starts a fresh history for
/// each binding it receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArchiveBundle {
    values: Vec<Value>,
    job_records: Vec<JobRecord>,
    aliases: BTreeMap<String, ValueId>,
}

/// The process-wide handle a caller constructs once: binds the archive
/// backends, the job cache, the operation and data-type registries, and
/// the processor strategy selected by [`EngineConfig`].
pub struct EngineContext {
    config: EngineConfig,
    value_registry: Arc<ValueRegistry>,
    value_store: Arc<dyn ValueStore>,
    alias_store: Arc<dyn AliasRepository>,
    job_store: Arc<dyn JobRepository>,
    metadata_store: Arc<dyn MetadataRepository>,
    pipeline_store: Arc<dyn PipelineRepository>,
    module_resolver: Arc<dyn ModuleResolver>,
    operation_registry: OperationRegistry,
    data_type_registry: DataTypeRegistry,
    job_runner: Arc<JobRunner>,
    metrics: Arc<EngineMetrics>,
    shutdown: ShutdownCoordinator,
}

impl EngineContext {
    /// Builds a context from a loaded [`EngineConfig`], opening whichever
    /// archive backend the config selects and wiring every store into a
    /// shared [`JobRunner`]. The module resolver and operation registry are
    /// supplied by the caller - they stand in for the module type registry
    /// a concrete deployment would populate from its installed modules
    /// (§1, out of scope for this crate).
    pub async fn new(config: EngineConfig, module_resolver: Arc<dyn ModuleResolver>, operation_registry: OperationRegistry) -> Result<Self, EngineError> {
        let (value_store, alias_store, job_store, metadata_store, pipeline_store) = match config.archive_backend {
            ArchiveBackend::Filesystem => {
                let value_store: Arc<dyn ValueStore> =
                    Arc::new(FilesystemValueStore::open(ArchiveId::new("data"), config.archive_dir("data")).await?);
                let alias_store: Arc<dyn AliasRepository> = Arc::new(FilesystemAliasStore::open(config.archive_dir("aliases")).await?);
                let job_store: Arc<dyn JobRepository> = Arc::new(FilesystemJobStore::open(config.archive_dir("jobs")).await?);
                let metadata_store: Arc<dyn MetadataRepository> = Arc::new(FilesystemMetadataStore::open(config.archive_dir("metadata")).await?);
                let pipeline_store: Arc<dyn PipelineRepository> = Arc::new(FilesystemPipelineStore::open(config.archive_dir("workflows")).await?);
                (value_store, alias_store, job_store, metadata_store, pipeline_store)
            }
            ArchiveBackend::Sqlite => {
                let db_path = config.archive_dir("db").join("flowforge.db");
                let value_store: Arc<dyn ValueStore> = Arc::new(SqliteValueStore::open(ArchiveId::new("data"), &db_path).await?);
                let alias_store: Arc<dyn AliasRepository> = Arc::new(SqliteAliasStore::open(&db_path).await?);
                let job_store: Arc<dyn JobRepository> = Arc::new(SqliteJobStore::open(&db_path).await?);
                let metadata_store: Arc<dyn MetadataRepository> = Arc::new(SqliteMetadataStore::open(&db_path).await?);
                let pipeline_store: Arc<dyn PipelineRepository> = Arc::new(SqlitePipelineStore::open(&db_path).await?);
                (value_store, alias_store, job_store, metadata_store, pipeline_store)
            }
        };

        let processor: Arc<dyn Processor> = match config.processor_kind {
            ProcessorKind::Synchronous => Arc::new(SynchronousProcessor::new()),
            ProcessorKind::Parallel => Arc::new(ParallelProcessor::new(config.worker_count())),
        };

        let value_registry = Arc::new(ValueRegistry::new());
        let metrics = Arc::new(EngineMetrics::new()?);
        let job_runner = Arc::new(JobRunner::new(
            module_resolver.clone(),
            value_registry.clone(),
            value_store.clone(),
            job_store.clone(),
            processor,
            metrics.clone(),
        ));

        Ok(Self {
            config,
            value_registry,
            value_store,
            alias_store,
            job_store,
            metadata_store,
            pipeline_store,
            module_resolver,
            operation_registry,
            data_type_registry: DataTypeRegistry::with_core_types(),
            job_runner,
            metrics,
            shutdown: ShutdownCoordinator::default(),
        })
    }

    pub fn value_registry(&self) -> &Arc<ValueRegistry> {
        &self.value_registry
    }

    pub fn data_type_registry(&self) -> &DataTypeRegistry {
        &self.data_type_registry
    }

    pub fn operation_registry(&self) -> &OperationRegistry {
        &self.operation_registry
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.config.job_timeout_default_secs)
    }

    /// Runs a single standalone job to completion and blocks on it, sharing
    /// the same cache-then-execute policy a pipeline step would use (§4.F).
    pub async fn run_job(&self, manifest: Manifest, inputs: ValueMap, comment: impl Into<String>) -> Result<JobOutcome, EngineError> {
        self.job_runner
            .run(manifest, inputs, comment.into(), self.default_timeout(), self.shutdown.token(), JobRunner::adhoc_step_id())
            .await
    }

    /// Submits a job without waiting for it, returning a handle the caller
    /// may await later - the `queue_job` half of §4.K, as distinct from
    /// `run_job`'s blocking submission.
    pub fn queue_job(&self, manifest: Manifest, inputs: ValueMap, comment: impl Into<String>) -> tokio::task::JoinHandle<Result<JobOutcome, EngineError>> {
        let job_runner = self.job_runner.clone();
        let timeout = self.default_timeout();
        let token = self.shutdown.token();
        let comment = comment.into();
        tokio::spawn(async move { job_runner.run(manifest, inputs, comment, timeout, token, JobRunner::adhoc_step_id()).await })
    }

    /// Resolves `apply_operation(op_type, value, extra_args)` (§4.J):
    /// dispatches to the manifest a module registered for `dispatch_key`
    /// under `operation_type`, renames input fields per that registration,
    /// and submits it as an ordinary job - inheriting caching and lineage.
    pub async fn apply_operation(
        &self,
        operation_type: &str,
        dispatch_key: &str,
        inputs: ValueMap,
        comment: impl Into<String>,
    ) -> Result<JobOutcome, EngineError> {
        let template = self.operation_registry.resolve(operation_type, dispatch_key)?.clone();
        let remapped: ValueMap = inputs
            .into_iter()
            .map(|(field, value)| {
                let mapped_field = template.input_field_map.get(&field).cloned().unwrap_or(field);
                (mapped_field, value)
            })
            .collect();
        self.run_job(template.manifest, remapped, comment).await
    }

    /// Resolves a [`ValueReference`] to the live value it names. An id
    /// resolves against the in-memory registry directly; an alias is
    /// looked up in the alias store and then resolved the same way; a
    /// literal is registered on the fly against its declared schema.
    pub async fn get_value(&self, reference: ValueReference) -> Result<Arc<Value>, EngineError> {
        match reference {
            ValueReference::Id(id) => self.value_registry.get(id),
            ValueReference::Alias(name) => {
                let id = self.alias_store.lookup_alias(&name).await?.ok_or_else(|| EngineError::UnknownAlias(name.clone()))?;
                self.value_registry.get(id)
            }
            ValueReference::Literal { schema, payload_bytes } => self.value_registry.register_value(schema, None, payload_bytes, ValueOrigin::external("literal")),
        }
    }

    /// Registers a value and persists it to the data store, optionally
    /// binding an alias to it in the same call (S3 "value aliasing").
    pub async fn store_value(
        &self,
        schema: ValueSchema,
        data_type_config: Option<JsonValue>,
        payload_bytes: Vec<u8>,
        origin: ValueOrigin,
        alias: Option<String>,
    ) -> Result<Arc<Value>, EngineError> {
        let value = self.value_registry.register_value(schema, data_type_config, payload_bytes, origin)?;
        self.value_store.write_value(&value).await?;
        if let Some(name) = alias {
            self.alias_store.write_alias(&name, value.id()).await?;
        }
        Ok(value)
    }

    pub async fn resolve_alias(&self, name: &str) -> Result<Option<ValueId>, EngineError> {
        self.alias_store.lookup_alias(name).await
    }

    pub async fn list_aliases(&self) -> Result<Vec<String>, EngineError> {
        self.alias_store.list_aliases().await
    }

    pub async fn alias_history(&self, name: &str) -> Result<Vec<AliasHistoryEntry>, EngineError> {
        self.alias_store.alias_history(name).await
    }

    pub async fn get_job_record(&self, job_hash: JobHash) -> Result<Option<JobRecord>, EngineError> {
        self.job_store.lookup_job(job_hash).await
    }

    /// Writes a named [`PipelineDeclaration`] so later callers can
    /// `list_pipelines`/`get_pipeline` instead of re-supplying the graph.
    pub async fn save_pipeline(&self, declaration: PipelineDeclaration) -> Result<(), EngineError> {
        self.pipeline_store.save_pipeline(declaration).await
    }

    pub async fn list_pipelines(&self) -> Result<Vec<String>, EngineError> {
        self.pipeline_store.list_pipelines().await
    }

    pub async fn get_pipeline(&self, pipeline_name: &str) -> Result<Option<PipelineDeclaration>, EngineError> {
        self.pipeline_store.load_pipeline(pipeline_name).await
    }

    /// Compiles a declaration against this context's module resolver (§4.G).
    pub async fn compile_pipeline(&self, declaration: PipelineDeclaration) -> Result<PipelineStructure, EngineError> {
        PipelineStructure::compile(declaration, self.module_resolver.as_ref()).await
    }

    /// Drives a compiled structure to completion, binding pipeline inputs
    /// and running every stage through this context's shared job runner.
    pub async fn run_pipeline<'a>(
        &self,
        structure: &'a PipelineStructure,
        pipeline_inputs: BTreeMap<String, ValueId>,
        comment: impl Into<String> + Clone,
    ) -> Result<BTreeMap<String, ValueId>, EngineError> {
        let mut controller = PipelineController::new(structure, self.job_runner.clone(), self.shutdown.token(), self.default_timeout());
        controller.set_pipeline_inputs(pipeline_inputs);
        controller.run_to_completion(comment).await
    }

    /// Bundles every stored value, job record, and current alias binding
    /// into a single file (property 8, S5). The wire shape is an
    /// implementation detail of this context, not a spec'd archive format.
    pub async fn export_archive(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let mut values = Vec::new();
        for hash in self.value_store.iter_values().await? {
            values.push(self.value_store.load_value(hash).await?);
        }
        let job_records = self.job_store.iter_jobs().await?;

        let mut aliases = BTreeMap::new();
        for name in self.alias_store.list_aliases().await? {
            if let Some(id) = self.alias_store.lookup_alias(&name).await? {
                aliases.insert(name, id);
            }
        }

        let bundle = ArchiveBundle { values, job_records, aliases };
        let bytes = serde_json::to_vec_pretty(&bundle)?;
        if let Some(parent) = path.as_ref().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path.as_ref(), bytes).await?;
        Ok(())
    }

    /// Replays a bundle written by [`Self::export_archive`] into this
    /// context's stores, adopting every value into the in-memory registry
    /// so it is immediately resolvable by id.
    pub async fn import_archive(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let bundle: ArchiveBundle = serde_json::from_slice(&bytes)?;

        for value in bundle.values {
            self.value_store.write_value(&value).await?;
            self.value_registry.adopt(value);
        }
        for record in bundle.job_records {
            self.job_store.record_job(record).await?;
        }
        for (name, value_id) in bundle.aliases {
            self.alias_store.write_alias(&name, value_id).await?;
        }
        Ok(())
    }

    /// Occupancy counts across every store, for the CLI's `archive info`
    /// subcommand (an external collaborator, but this is the data it would
    /// display).
    pub async fn retrieve_archive_info(&self) -> Result<ArchiveInfo, EngineError> {
        Ok(ArchiveInfo {
            archive_backend: self.config.archive_backend,
            value_count: self.value_store.iter_values().await?.len(),
            job_count: self.job_store.iter_jobs().await?.len(),
            alias_count: self.alias_store.list_aliases().await?.len(),
        })
    }

    pub async fn write_metadata(&self, value_hash: flowforge_domain::value_objects::ValueHash, metadata: JsonValue) -> Result<(), EngineError> {
        self.metadata_store.write_metadata(value_hash, metadata).await
    }

    pub async fn load_metadata(&self, value_hash: flowforge_domain::value_objects::ValueHash) -> Result<Option<JsonValue>, EngineError> {
        self.metadata_store.load_metadata(value_hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flowforge_domain::services::module_contract::{Module, SchemaMap};
    use flowforge_domain::value_objects::ValueStatus;
    use std::collections::BTreeMap as Map;

    struct Echo;

    #[async_trait]
    impl Module for Echo {
        fn inputs_schema(&self) -> SchemaMap {
            Map::from([("value".to_string(), ValueSchema::new("string"))])
        }
        fn outputs_schema(&self) -> SchemaMap {
            Map::from([("value".to_string(), ValueSchema::new("string"))])
        }
        async fn process(&self, inputs: ValueMap) -> Result<ValueMap, EngineError> {
            Ok(Map::from([("value".to_string(), inputs["value"].clone())]))
        }
    }

    struct EchoResolver;

    #[async_trait]
    impl ModuleResolver for EchoResolver {
        async fn resolve(&self, _manifest: &Manifest) -> Result<Box<dyn Module>, EngineError> {
            Ok(Box::new(Echo))
        }
    }

    async fn sample_context() -> (EngineContext, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.context_root = dir.path().to_path_buf();
        config.processor_kind = ProcessorKind::Synchronous;
        let context = EngineContext::new(config, Arc::new(EchoResolver), OperationRegistry::new()).await.unwrap();
        (context, dir)
    }

    #[tokio::test]
    async fn run_job_persists_a_completed_record() {
        let (context, _dir) = sample_context().await;
        let input = context
            .value_registry()
            .register_value(ValueSchema::new("string"), None, b"\"hi\"".to_vec(), ValueOrigin::external("test"))
            .unwrap();
        let inputs = Map::from([("value".to_string(), (*input).clone())]);

        let outcome = context.run_job(Manifest::new("echo"), inputs, "first run").await.unwrap();
        assert!(!outcome.from_cache);

        let record = context.get_job_record(outcome.job_hash).await.unwrap().unwrap();
        assert!(record.is_successful());
    }

    #[tokio::test]
    async fn store_value_with_alias_resolves_through_get_value() {
        let (context, _dir) = sample_context().await;
        let stored = context
            .store_value(ValueSchema::new("string"), None, b"\"hi\"".to_vec(), ValueOrigin::external("test"), Some("greeting".to_string()))
            .await
            .unwrap();

        let resolved = context.resolve_alias("greeting").await.unwrap();
        assert_eq!(resolved, Some(stored.id()));

        let fetched = context.get_value(ValueReference::Alias("greeting".to_string())).await.unwrap();
        assert_eq!(fetched.id(), stored.id());
    }

    #[tokio::test]
    async fn rebinding_an_alias_preserves_its_history() {
        let (context, _dir) = sample_context().await;
        context
            .store_value(ValueSchema::new("string"), None, b"\"v1\"".to_vec(), ValueOrigin::external("test"), Some("my_table".to_string()))
            .await
            .unwrap();
        context
            .store_value(ValueSchema::new("string"), None, b"\"v2\"".to_vec(), ValueOrigin::external("test"), Some("my_table".to_string()))
            .await
            .unwrap();

        assert_eq!(context.alias_history("my_table").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn export_then_import_round_trips_values_jobs_and_aliases() {
        let (source, _source_dir) = sample_context().await;
        let stored = source
            .store_value(ValueSchema::new("string"), None, b"\"hi\"".to_vec(), ValueOrigin::external("test"), Some("greeting".to_string()))
            .await
            .unwrap();
        let inputs = Map::from([("value".to_string(), (*stored).clone())]);
        source.run_job(Manifest::new("echo"), inputs, "export test").await.unwrap();

        let bundle_dir = tempfile::tempdir().unwrap();
        let bundle_path = bundle_dir.path().join("bundle.json");
        source.export_archive(&bundle_path).await.unwrap();

        let (destination, _dest_dir) = sample_context().await;
        destination.import_archive(&bundle_path).await.unwrap();

        assert_eq!(destination.resolve_alias("greeting").await.unwrap(), Some(stored.id()));
        let imported_value = destination.value_registry().get(stored.id()).unwrap();
        assert_eq!(imported_value.value_hash(), stored.value_hash());

        let source_info = source.retrieve_archive_info().await.unwrap();
        let destination_info = destination.retrieve_archive_info().await.unwrap();
        assert_eq!(source_info.value_count, destination_info.value_count);
        assert_eq!(source_info.job_count, destination_info.job_count);
        assert_eq!(source_info.alias_count, destination_info.alias_count);
    }

    #[allow(dead_code)]
    fn unused_status(_status: ValueStatus) {}
}
