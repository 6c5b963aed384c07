// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Value objects: immutable, validated types with no identity of their own
//! beyond their content.

pub mod generic_id;
pub mod hashes;
pub mod lifecycle_status;
pub mod origin;
pub mod pipeline_run_id;
pub mod stage_index;
pub mod step_id;
pub mod value_id;
pub mod worker_count;

pub use generic_id::{GenericId, IdCategory};
pub use hashes::{InputsHash, JobHash, ManifestHash, PipelineHash, SchemaHash, ValueHash};
pub use lifecycle_status::ValueStatus;
pub use origin::ValueOrigin;
pub use pipeline_run_id::PipelineRunId;
pub use stage_index::StageIndex;
pub use step_id::StepId;
pub use value_id::ValueId;
pub use worker_count::WorkerCount;
