// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Infrastructure: everything that performs I/O on the domain layer's
//! behalf - archive backends, the processor's concrete worker pool,
//! configuration, logging, and metrics.

pub mod archives;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod processor;
