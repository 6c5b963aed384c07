// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Flowforge Bootstrap
//!
//! Process bootstrap for the workflow engine: logger initialization, signal
//! handling and graceful shutdown coordination, and platform resource
//! probing (CPU count, memory, temp directory). This crate sits **outside**
//! the engine's domain/application/infrastructure layers - it is the
//! composition root's composition root, responsible only for the parts of
//! process lifecycle that have nothing to do with pipelines or values.
//!
//! The CLI subcommand surface described in the engine's external-interfaces
//! design is an explicit non-goal of this repository (it is the consumer of
//! [`flowforge::context::EngineContext`](../flowforge/context/struct.EngineContext.html),
//! built elsewhere) - this crate therefore has no argument parser.
//!
//! ## Module Structure
//!
//! - [`platform`] - OS abstraction (Unix/Windows) for CPU/memory probing and
//!   file sync, selected at compile time.
//! - [`signals`] - SIGTERM/SIGINT/SIGHUP handling that feeds
//!   [`shutdown::ShutdownCoordinator`].
//! - [`logger`] - a minimal, trait-based logging facade used during the
//!   bootstrap phase, before the engine's own `tracing` subscriber is
//!   installed.
//! - [`shutdown`] - cancellation-token based shutdown coordination, handed
//!   to the parallel processor so in-flight `wait_for` calls can honor
//!   cooperative cancellation.

pub mod logger;
pub mod platform;
pub mod shutdown;
pub mod signals;

pub use logger::{BootstrapLogger, ConsoleLogger, NoOpLogger};
pub use platform::{create_platform, Platform, PlatformError};
pub use shutdown::{CancellationToken, ShutdownCoordinator};
pub use signals::{create_signal_handler, SystemSignals};

/// Initializes the bootstrap-phase logger and returns a shutdown
/// coordinator wired to the process's termination signals.
///
/// This is the composition root's entry point: call it once, early in
/// `main`, before constructing an `EngineContext`. The returned
/// coordinator's [`ShutdownCoordinator::token`] should be threaded into the
/// parallel processor (§5 "Cancellation & timeouts").
pub fn bootstrap(grace_period: std::time::Duration) -> (ConsoleLogger, ShutdownCoordinator) {
    let logger = ConsoleLogger::new();
    let coordinator = ShutdownCoordinator::new(grace_period);
    (logger, coordinator)
}

/// Spawns a background task that waits for a termination signal and then
/// initiates graceful shutdown on `coordinator`.
pub fn spawn_signal_watcher(coordinator: ShutdownCoordinator) {
    tokio::spawn(async move {
        let handler = create_signal_handler();
        let coordinator = coordinator.clone();
        handler
            .wait_for_signal(Box::new(move || coordinator.initiate_shutdown()))
            .await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bootstrap_returns_a_fresh_coordinator() {
        let (_logger, coordinator) = bootstrap(Duration::from_secs(1));
        assert!(!coordinator.is_shutting_down());
    }
}
