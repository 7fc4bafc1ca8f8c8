//! Pipeline metrics.
//!
//! Counters and histograms go through the `metrics` facade and are no-ops
//! until the host installs a recorder. [`ExecutionMetrics`] is the one piece
//! of state the pipeline itself reads back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};

use crate::config::PerformanceConfig;

/// Metric names as constants for consistency.
pub mod names {
    pub const PIPELINE_REQUESTS_TOTAL: &str = "pipeline_requests_total";
    pub const PIPELINE_REQUEST_DURATION_SECONDS: &str = "pipeline_request_duration_seconds";
    pub const PIPELINE_SLOW_REQUESTS_TOTAL: &str = "pipeline_slow_requests_total";

    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
}

/// Record one completed `send`.
pub fn record_request(request: &str, outcome: &str) {
    counter!(
        names::PIPELINE_REQUESTS_TOTAL,
        "request" => request.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_request_duration(request: &str, duration: Duration) {
    histogram!(names::PIPELINE_REQUEST_DURATION_SECONDS, "request" => request.to_string())
        .record(duration.as_secs_f64());
}

pub fn record_slow_request(request: &str) {
    counter!(names::PIPELINE_SLOW_REQUESTS_TOTAL, "request" => request.to_string()).increment(1);
}

pub fn record_cache_hit(request: &str) {
    counter!(names::CACHE_HITS_TOTAL, "request" => request.to_string()).increment(1);
}

pub fn record_cache_miss(request: &str) {
    counter!(names::CACHE_MISSES_TOTAL, "request" => request.to_string()).increment(1);
}

/// Execution count and start instant, shared by every pipeline built from it.
#[derive(Debug)]
pub struct ExecutionMetrics {
    started_at: Instant,
    executions: AtomicU64,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(started_at: Instant) -> Self {
        Self {
            started_at,
            executions: AtomicU64::new(0),
        }
    }

    /// Count one execution and return its 1-based ordinal.
    pub fn record_execution(&self) -> u64 {
        self.executions.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Whether execution number `execution` falls inside the warm-up window.
    pub fn is_warming_up(&self, execution: u64, config: &PerformanceConfig) -> bool {
        execution <= config.warmup_executions || self.uptime() < config.warmup_period()
    }

    /// Slow-request threshold for execution number `execution`.
    pub fn threshold_for(&self, execution: u64, config: &PerformanceConfig) -> Duration {
        if self.is_warming_up(execution, config) {
            config.warmup_threshold()
        } else {
            config.threshold()
        }
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}
