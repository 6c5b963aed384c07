// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Engine Events
//!
//! The four callback kinds the controller contract fires on every state
//! transition (§4.H), plus job lifecycle notifications the processor raises
//! as it dispatches and completes work. All updates within one logical
//! transition are published before any of these fire, so a handler always
//! observes a coherent snapshot (§5 "Ordering guarantees").

use serde::{Deserialize, Serialize};

use crate::value_objects::{JobHash, StepId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineEvent {
    PipelineInputsChanged { fields: Vec<String> },
    StepInputsChanged { step_id: StepId, fields: Vec<String> },
    StepOutputsChanged { step_id: StepId, fields: Vec<String> },
    PipelineOutputsChanged { fields: Vec<String> },
    JobStarted { job_hash: JobHash, step_id: StepId },
    JobCompleted { job_hash: JobHash, step_id: StepId },
    JobFailed { job_hash: JobHash, step_id: StepId, reason: String },
    JobCancelled { job_hash: JobHash, step_id: StepId },
}

/// Subscriber to [`EngineEvent`]s, invoked synchronously from the
/// controller's single mutation thread. Handlers must not block on module
/// execution (§5 "Suspension points").
pub trait EngineObserver: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

/// An observer that forwards events to any number of subscribers in
/// registration order.
#[derive(Default)]
pub struct EventBroadcaster {
    observers: Vec<Box<dyn EngineObserver>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn EngineObserver>) {
        self.observers.push(observer);
    }

    pub fn publish(&self, event: EngineEvent) {
        for observer in &self.observers {
            observer.on_event(&event);
        }
    }
}
