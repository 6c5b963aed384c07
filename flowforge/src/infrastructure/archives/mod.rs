// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Archive Backends
//!
//! Two concrete implementations of the domain's `ValueArchive`/`ValueStore`,
//! `AliasRepository`, `JobRepository`, `MetadataRepository`, and
//! `PipelineRepository` ports (§4.D): a sharded content-addressed filesystem
//! tree, and a single embedded SQLite database. An `EngineContext` picks one
//! per [`crate::infrastructure::config::ArchiveBackend`] and is otherwise
//! indifferent to which backend it is talking to.

pub mod filesystem;
pub mod sqlite;

pub use filesystem::{FilesystemAliasStore, FilesystemJobStore, FilesystemMetadataStore, FilesystemPipelineStore, FilesystemValueStore};
pub use sqlite::{SqliteAliasStore, SqliteJobStore, SqliteMetadataStore, SqlitePipelineStore, SqliteValueStore};
