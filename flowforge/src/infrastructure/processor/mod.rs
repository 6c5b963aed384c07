// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Processor
//!
//! Executes one step's module against its resolved inputs (§4.I). A
//! `Processor` is deliberately ignorant of pipeline structure or caching -
//! it is handed a manifest-resolved module, its inputs, a job hash for
//! error context, a per-job timeout, and a cancellation token, and returns
//! either the module's outputs or a classified failure.
//!
//! Two strategies are provided, mirroring the teacher's stage-execution
//! split between running inline and running across a worker pool
//! (`infrastructure/runtime/stage_executor.rs`, `resource_manager.rs`):
//! [`synchronous::SynchronousProcessor`] runs on the caller's own task,
//! [`parallel::ParallelProcessor`] dispatches onto a bounded pool.
//!
//! `EngineError::ModuleFailure` surfaces exactly as the module raised it;
//! anything a module lets escape - a panic - is caught and reported as
//! `EngineError::ModuleCrash`, per §4.E's failure/crash distinction. A
//! deadline miss is reported as `EngineError::JobTimeout`; an
//! already-cancelled token short-circuits before the module ever runs.

pub mod parallel;
pub mod synchronous;

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;

use flowforge_bootstrap::CancellationToken;
use flowforge_domain::error::EngineError;
use flowforge_domain::services::module_contract::{Module, ValueMap};
use flowforge_domain::value_objects::{JobHash, StepId};

pub use parallel::ParallelProcessor;
pub use synchronous::SynchronousProcessor;

/// Everything a processor needs to run one step, independent of whatever
/// pipeline it belongs to.
pub struct StepExecution {
    pub job_hash: JobHash,
    pub step_id: StepId,
    pub module: Box<dyn Module>,
    pub inputs: ValueMap,
    pub timeout: Duration,
}

/// Runs a manifest-resolved module's `process` against its inputs and
/// classifies the outcome, per §4.I.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn run_step(&self, execution: StepExecution, cancellation: CancellationToken) -> Result<ValueMap, EngineError>;
}

/// Shared execution core both strategies delegate to: check cancellation,
/// race the module's `process` against the deadline, and classify a panic
/// as a crash rather than letting it propagate.
async fn execute(execution: StepExecution, cancellation: CancellationToken) -> Result<ValueMap, EngineError> {
    let step_id = execution.step_id;
    let job_hash = execution.job_hash;
    let timeout = execution.timeout;
    let module = execution.module;
    let inputs = execution.inputs;

    if cancellation.is_cancelled() {
        return Err(EngineError::Cancelled(step_id.to_string()));
    }

    let started = Instant::now();
    let work = AssertUnwindSafe(async move { module.process(inputs).await }).catch_unwind();

    tokio::select! {
        biased;
        _ = cancellation.cancelled() => Err(EngineError::Cancelled(step_id.to_string())),
        outcome = tokio::time::timeout(timeout, work) => match outcome {
            Err(_elapsed) => Err(EngineError::JobTimeout {
                job_hash: job_hash.to_string(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
            Ok(Ok(Ok(outputs))) => Ok(outputs),
            Ok(Ok(Err(engine_error))) => Err(engine_error),
            Ok(Err(_panic)) => Err(EngineError::ModuleCrash(format!("step {step_id} panicked"))),
        },
    }
}

#[cfg(test)]
mod shared_tests {
    use super::*;
    use flowforge_domain::entities::ValueSchema;
    use flowforge_domain::services::module_contract::SchemaMap;
    use flowforge_bootstrap::ShutdownCoordinator;
    use std::collections::BTreeMap;

    struct SlowModule;

    #[async_trait]
    impl Module for SlowModule {
        fn inputs_schema(&self) -> SchemaMap {
            BTreeMap::new()
        }
        fn outputs_schema(&self) -> SchemaMap {
            BTreeMap::new()
        }
        async fn process(&self, _inputs: ValueMap) -> Result<ValueMap, EngineError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(BTreeMap::new())
        }
    }

    struct PanickingModule;

    #[async_trait]
    impl Module for PanickingModule {
        fn inputs_schema(&self) -> SchemaMap {
            BTreeMap::new()
        }
        fn outputs_schema(&self) -> SchemaMap {
            BTreeMap::new()
        }
        async fn process(&self, _inputs: ValueMap) -> Result<ValueMap, EngineError> {
            panic!("boom");
        }
    }

    fn sample_job_hash() -> JobHash {
        flowforge_domain::hashing::Multihash::of_bytes(b"job").into()
    }

    #[tokio::test]
    async fn timeout_is_reported_as_job_timeout() {
        let execution = StepExecution {
            job_hash: sample_job_hash(),
            step_id: StepId::new("slow").unwrap(),
            module: Box::new(SlowModule),
            inputs: BTreeMap::new(),
            timeout: Duration::from_millis(20),
        };
        let token = ShutdownCoordinator::default().token();
        let result = execute(execution, token).await;
        assert!(matches!(result, Err(EngineError::JobTimeout { .. })));
    }

    #[tokio::test]
    async fn panic_is_reported_as_module_crash() {
        let execution = StepExecution {
            job_hash: sample_job_hash(),
            step_id: StepId::new("boom").unwrap(),
            module: Box::new(PanickingModule),
            inputs: BTreeMap::new(),
            timeout: Duration::from_secs(5),
        };
        let token = ShutdownCoordinator::default().token();
        let result = execute(execution, token).await;
        assert!(matches!(result, Err(EngineError::ModuleCrash(_))));
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let coordinator = ShutdownCoordinator::default();
        coordinator.initiate_shutdown();
        let execution = StepExecution {
            job_hash: sample_job_hash(),
            step_id: StepId::new("slow").unwrap(),
            module: Box::new(SlowModule),
            inputs: BTreeMap::new(),
            timeout: Duration::from_secs(5),
        };
        let result = execute(execution, coordinator.token()).await;
        assert!(matches!(result, Err(EngineError::Cancelled(_))));
    }
}
