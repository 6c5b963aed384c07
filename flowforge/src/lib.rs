// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Flowforge
//!
//! The application, infrastructure, and facade layers built on top of
//! [`flowforge_domain`]'s pure value/manifest/job/pipeline model. This crate
//! supplies everything the domain layer declares only as a port: concrete
//! archive backends, the pipeline controller's dispatch to a processor, and
//! the [`application::context::EngineContext`] facade that binds them all
//! together.
//!
//! The CLI subcommand surface named in the engine's external-interfaces
//! design (`run`, `info`, `context`, `archive`, `data`, `module`,
//! `operation`, `pipeline`, `data-type`, `render`, `plugin`) is an explicit
//! non-goal of this repository - it is the consumer of
//! [`application::context::EngineContext`], built elsewhere.
//!
//! ## Layout
//!
//! - [`infrastructure::config`] - layered configuration (defaults → file →
//!   environment).
//! - [`infrastructure::logging`] - `tracing` subscriber installation and job
//!   execution spans.
//! - [`infrastructure::metrics`] - the Prometheus-backed collector.
//! - [`infrastructure::archives`] - the filesystem and embedded-relational
//!   (SQLite) archive/store backends (§4.D).
//! - [`infrastructure::processor`] - the synchronous and parallel processor
//!   strategies (§4.I).
//! - [`application::context`] - the `EngineContext` facade (§4.K).
//! - [`application::controller`] - the pipeline controller that drives a
//!   compiled structure's state machine to completion (§4.H).

pub mod application;
pub mod infrastructure;

pub use application::context::EngineContext;
pub use application::controller::PipelineController;
