// /////////////////////////////////////////////////////////////////////////////
// Flowforge
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics
//!
//! A small Prometheus-backed collector, grounded in the teacher's
//! `infrastructure/metrics` service. Tracks job counts (by outcome), job
//! durations, the job-cache hit ratio, worker-pool utilization, and archive
//! write latency - the observability the engine carries regardless of the
//! CLI/plugin Non-goals, per SPEC_FULL §2.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use flowforge_domain::EngineError;

pub struct EngineMetrics {
    registry: Registry,
    pub jobs_total: IntCounterVec,
    pub job_duration_seconds: Histogram,
    pub job_cache_hits_total: IntCounter,
    pub job_cache_misses_total: IntCounter,
    pub worker_pool_active: IntGauge,
    pub archive_write_latency_seconds: Histogram,
}

impl EngineMetrics {
    pub fn new() -> Result<Self, EngineError> {
        let registry = Registry::new();

        let jobs_total = IntCounterVec::new(
            Opts::new("flowforge_jobs_total", "Total jobs submitted, labeled by outcome"),
            &["outcome"],
        )
        .map_err(prom_err)?;

        let job_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "flowforge_job_duration_seconds",
            "Wall-clock duration of module `process` calls",
        ))
        .map_err(prom_err)?;

        let job_cache_hits_total =
            IntCounter::new("flowforge_job_cache_hits_total", "Job submissions served from the job cache").map_err(prom_err)?;
        let job_cache_misses_total =
            IntCounter::new("flowforge_job_cache_misses_total", "Job submissions that ran a module").map_err(prom_err)?;

        let worker_pool_active =
            IntGauge::new("flowforge_worker_pool_active", "Workers currently executing a step").map_err(prom_err)?;

        let archive_write_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "flowforge_archive_write_latency_seconds",
            "Latency of a single archive write_value/write_alias/write_job call",
        ))
        .map_err(prom_err)?;

        registry.register(Box::new(jobs_total.clone())).map_err(prom_err)?;
        registry.register(Box::new(job_duration_seconds.clone())).map_err(prom_err)?;
        registry.register(Box::new(job_cache_hits_total.clone())).map_err(prom_err)?;
        registry.register(Box::new(job_cache_misses_total.clone())).map_err(prom_err)?;
        registry.register(Box::new(worker_pool_active.clone())).map_err(prom_err)?;
        registry.register(Box::new(archive_write_latency_seconds.clone())).map_err(prom_err)?;

        Ok(Self {
            registry,
            jobs_total,
            job_duration_seconds,
            job_cache_hits_total,
            job_cache_misses_total,
            worker_pool_active,
            archive_write_latency_seconds,
        })
    }

    pub fn record_cache_hit(&self) {
        self.job_cache_hits_total.inc();
        self.jobs_total.with_label_values(&["cache_hit"]).inc();
    }

    pub fn record_completed(&self, duration_secs: f64) {
        self.job_cache_misses_total.inc();
        self.job_duration_seconds.observe(duration_secs);
        self.jobs_total.with_label_values(&["completed"]).inc();
    }

    pub fn record_failed(&self) {
        self.jobs_total.with_label_values(&["failed"]).inc();
    }

    pub fn record_cancelled(&self) {
        self.jobs_total.with_label_values(&["cancelled"]).inc();
    }

    /// Renders the registry in Prometheus text exposition format, for a
    /// `/metrics` endpoint an embedding application may expose.
    pub fn render(&self) -> Result<String, EngineError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).map_err(|e| EngineError::Internal(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| EngineError::Internal(e.to_string()))
    }
}

fn prom_err(err: prometheus::Error) -> EngineError {
    EngineError::Internal(format!("metrics error: {err}"))
}
