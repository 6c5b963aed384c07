// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Archive & Store Ports
//!
//! An archive is a read-only persistence boundary; a store additionally
//! accepts writes (§4.D, GLOSSARY). These traits are the seam between the
//! domain and infrastructure layers - filesystem and embedded-relational
//! backends both implement [`ValueStore`] (and, by extension, [`ValueArchive`]).
//! Writes are idempotent on value hash: a second `write_value` of an
//! already-stored hash is a no-op.

use async_trait::async_trait;

use crate::entities::Value;
use crate::error::EngineError;
use crate::value_objects::ValueHash;

/// The kind of content an archive instance holds, used to route context
/// configuration and, for tagged-variant dispatch, concrete backend choice.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ArchiveKind {
    Data,
    Jobs,
    Aliases,
    Workflows,
    Metadata,
}

/// A stable identifier for one archive instance, distinct from the kind of
/// content it holds - two data archives may coexist with different ids.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ArchiveId(String);

impl ArchiveId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only access to a content-addressed archive of values.
#[async_trait]
pub trait ValueArchive: Send + Sync {
    fn archive_id(&self) -> &ArchiveId;
    fn kind(&self) -> ArchiveKind;

    async fn contains(&self, value_hash: ValueHash) -> Result<bool, EngineError>;
    async fn load_value(&self, value_hash: ValueHash) -> Result<Value, EngineError>;
    async fn iter_values(&self) -> Result<Vec<ValueHash>, EngineError>;
}

/// A writable archive. Implementors must serialize concurrent writers -
/// many readers, one writer at a time, per §5 "Shared resources".
#[async_trait]
pub trait ValueStore: ValueArchive {
    async fn write_value(&self, value: &Value) -> Result<(), EngineError>;
}
