// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metadata Repository Port
//!
//! The engine's extract-metadata operation (§4.J) produces well-known
//! property maps (row counts, dimensions, checksums) for a value without
//! re-serializing the value itself. Those maps are kept in their own
//! archive, keyed by the value hash they describe, distinct from the
//! handful of ad-hoc attachments a [`crate::entities::Value`] may carry
//! directly (§4.D lists `metadata` as its own archive kind).

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::EngineError;
use crate::value_objects::ValueHash;

#[async_trait]
pub trait MetadataRepository: Send + Sync {
    async fn write_metadata(&self, value_hash: ValueHash, metadata: JsonValue) -> Result<(), EngineError>;
    async fn load_metadata(&self, value_hash: ValueHash) -> Result<Option<JsonValue>, EngineError>;
}
