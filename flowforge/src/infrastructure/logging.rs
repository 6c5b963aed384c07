// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logging
//!
//! `tracing` + `tracing-subscriber` initialization for the engine's own
//! structured spans, following the teacher's `infrastructure/logging`
//! module. This is distinct from [`flowforge_bootstrap::logger`], which
//! covers only the bootstrap phase before this subscriber is installed.
//!
//! Spans are opened around job execution, archive writes, and controller
//! ticks so a `RUST_LOG=flowforge=debug` run traces a job from dispatch
//! through cache lookup to completion.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global `tracing` subscriber reading its filter from
/// `RUST_LOG` (defaulting to `info`). Idempotent: a second call after one
/// already succeeded is a harmless no-op, since subsequent attempts to set
/// the global default fail and are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}

/// A span covering one job's full lifecycle: cache lookup, `process`
/// dispatch (on a miss), output registration, and job record write.
pub fn job_span(job_hash: &str, step_id: &str) -> tracing::Span {
    tracing::info_span!("job", job_hash = %job_hash, step_id = %step_id)
}

/// A span covering one archive write (value, alias, or job record).
pub fn archive_write_span(archive_kind: &str) -> tracing::Span {
    tracing::debug_span!("archive_write", kind = %archive_kind)
}

/// A span covering one controller tick: a batch of slot mutations plus the
/// callbacks they trigger, published atomically (§5 "Ordering guarantees").
pub fn controller_tick_span() -> tracing::Span {
    tracing::trace_span!("controller_tick")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_carry_their_declared_fields() {
        let span = job_span("sha256:abc", "step-1");
        assert_eq!(span.metadata().unwrap().name(), "job");
    }
}
