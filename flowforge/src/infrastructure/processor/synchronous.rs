// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Synchronous Processor
//!
//! Runs a step's module on the caller's own task: no spawning, no worker
//! pool. The natural choice for an embedding application driving one job
//! at a time, or for tests that want deterministic, non-interleaved step
//! execution.

use async_trait::async_trait;

use flowforge_bootstrap::CancellationToken;
use flowforge_domain::error::EngineError;
use flowforge_domain::services::module_contract::ValueMap;

use super::{execute, Processor, StepExecution};

#[derive(Debug, Default, Clone, Copy)]
pub struct SynchronousProcessor;

impl SynchronousProcessor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Processor for SynchronousProcessor {
    async fn run_step(&self, execution: StepExecution, cancellation: CancellationToken) -> Result<ValueMap, EngineError> {
        execute(execution, cancellation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowforge_bootstrap::ShutdownCoordinator;
    use flowforge_domain::entities::ValueSchema;
    use flowforge_domain::services::module_contract::{Module, SchemaMap};
    use flowforge_domain::value_objects::StepId;
    use std::collections::BTreeMap;
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl Module for Echo {
        fn inputs_schema(&self) -> SchemaMap {
            BTreeMap::from([("x".to_string(), ValueSchema::new("string"))])
        }
        fn outputs_schema(&self) -> SchemaMap {
            BTreeMap::from([("x".to_string(), ValueSchema::new("string"))])
        }
        async fn process(&self, inputs: ValueMap) -> Result<ValueMap, EngineError> {
            Ok(inputs)
        }
    }

    #[tokio::test]
    async fn runs_a_module_and_returns_its_outputs() {
        let processor = SynchronousProcessor::new();
        let job_hash = flowforge_domain::hashing::Multihash::of_bytes(b"job").into();
        let value = flowforge_domain::entities::Value::new(
            ValueSchema::new("string"),
            None,
            b"hi".to_vec(),
            flowforge_domain::value_objects::ValueOrigin::external("test"),
            flowforge_domain::value_objects::ValueStatus::Set,
        )
        .unwrap();

        let execution = StepExecution {
            job_hash,
            step_id: StepId::new("echo").unwrap(),
            module: Box::new(Echo),
            inputs: BTreeMap::from([("x".to_string(), value)]),
            timeout: Duration::from_secs(5),
        };

        let outputs = processor.run_step(execution, ShutdownCoordinator::default().token()).await.unwrap();
        assert!(outputs.contains_key("x"));
    }
}
