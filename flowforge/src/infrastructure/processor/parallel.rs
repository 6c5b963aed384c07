// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Parallel Processor
//!
//! A bounded pool of `tokio` worker tasks reading from a shared queue, each
//! step's result delivered back through a one-shot completion channel.
//! Grounded in the teacher's worker-pool shape
//! (`infrastructure/runtime/resource_manager.rs`'s bounded concurrency,
//! `stage_executor.rs`'s dispatch-and-await pattern), generalized from
//! fixed file-processing stages to arbitrary module steps.
//!
//! Workers are spawned once, at construction, and run until every clone of
//! the submission channel is dropped - there is no separate shutdown call;
//! dropping the last `ParallelProcessor` handle closes the queue and lets
//! every worker's receive loop end naturally.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

use flowforge_bootstrap::CancellationToken;
use flowforge_domain::error::EngineError;
use flowforge_domain::services::module_contract::ValueMap;
use flowforge_domain::value_objects::WorkerCount;

use super::{execute, Processor, StepExecution};

struct Submission {
    execution: StepExecution,
    cancellation: CancellationToken,
    respond_to: oneshot::Sender<Result<ValueMap, EngineError>>,
}

pub struct ParallelProcessor {
    sender: mpsc::Sender<Submission>,
}

impl ParallelProcessor {
    /// Spawns `worker_count` tasks pulling from a shared queue sized to
    /// twice the worker count, enough to absorb a short submission burst
    /// without a producer blocking on every call.
    pub fn new(worker_count: WorkerCount) -> Self {
        let capacity = (worker_count.get() * 2).max(1);
        let (sender, receiver) = mpsc::channel::<Submission>(capacity);
        let receiver = Arc::new(AsyncMutex::new(receiver));

        for _ in 0..worker_count.get() {
            let receiver = receiver.clone();
            tokio::spawn(async move {
                loop {
                    let next = { receiver.lock().await.recv().await };
                    let Some(submission) = next else { break };
                    let result = execute(submission.execution, submission.cancellation).await;
                    let _ = submission.respond_to.send(result);
                }
            });
        }

        Self { sender }
    }
}

#[async_trait]
impl Processor for ParallelProcessor {
    async fn run_step(&self, execution: StepExecution, cancellation: CancellationToken) -> Result<ValueMap, EngineError> {
        let (respond_to, await_result) = oneshot::channel();
        self.sender
            .send(Submission { execution, cancellation, respond_to })
            .await
            .map_err(|_| EngineError::Internal("parallel processor worker pool has shut down".to_string()))?;
        await_result.await.map_err(|_| EngineError::Internal("worker dropped without responding".to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowforge_bootstrap::ShutdownCoordinator;
    use flowforge_domain::services::module_contract::{Module, SchemaMap};
    use flowforge_domain::value_objects::StepId;
    use std::collections::BTreeMap;
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl Module for Echo {
        fn inputs_schema(&self) -> SchemaMap {
            BTreeMap::new()
        }
        fn outputs_schema(&self) -> SchemaMap {
            BTreeMap::new()
        }
        async fn process(&self, inputs: ValueMap) -> Result<ValueMap, EngineError> {
            Ok(inputs)
        }
    }

    fn sample_job_hash() -> flowforge_domain::value_objects::JobHash {
        flowforge_domain::hashing::Multihash::of_bytes(b"job").into()
    }

    #[tokio::test]
    async fn runs_many_steps_across_a_bounded_pool() {
        let processor = ParallelProcessor::new(WorkerCount::new(2).unwrap());
        let token = ShutdownCoordinator::default().token();

        let mut handles = Vec::new();
        for i in 0..8 {
            let execution = StepExecution {
                job_hash: sample_job_hash(),
                step_id: StepId::new(format!("step{i}")).unwrap(),
                module: Box::new(Echo),
                inputs: BTreeMap::new(),
                timeout: Duration::from_secs(5),
            };
            // `run_step` takes `&self`, so each submission can run concurrently
            // even though `processor` itself is not cloned.
            handles.push(processor.run_step(execution, token.clone()));
        }

        let results = futures::future::join_all(handles).await;
        assert!(results.into_iter().all(|r| r.is_ok()));
    }
}
