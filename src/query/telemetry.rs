//! Per-DAO query counters.

use super::predicate::QueryShape;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Logger target for slow-query events, routed to its own appender by `utils::logger`.
pub const METRICS_TARGET: &str = "daokit::metrics";

#[derive(Debug, Default)]
pub struct QueryMetrics {
    count_total: AtomicU64,
    ids_total: AtomicU64,
    fetch_total: AtomicU64,
    unique_total: AtomicU64,
    distinct_total: AtomicU64,
    slow_total: AtomicU64,
    backend_errors_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub count: u64,
    pub ids: u64,
    pub fetch: u64,
    pub unique: u64,
    pub distinct: u64,
    pub slow: u64,
    pub backend_errors: u64,
}

impl MetricsSnapshot {
    #[must_use]
    pub fn queries(&self) -> u64 {
        self.count + self.ids + self.fetch + self.unique + self.distinct
    }
}

impl QueryMetrics {
    pub fn record(&self, shape: QueryShape) {
        let counter = match shape {
            QueryShape::Count => &self.count_total,
            QueryShape::Ids => &self.ids_total,
            QueryShape::Fetch => &self.fetch_total,
            QueryShape::Unique => &self.unique_total,
            QueryShape::Distinct => &self.distinct_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_slow(&self) {
        self.slow_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backend_error(&self) {
        self.backend_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            count: self.count_total.load(Ordering::Relaxed),
            ids: self.ids_total.load(Ordering::Relaxed),
            fetch: self.fetch_total.load(Ordering::Relaxed),
            unique: self.unique_total.load(Ordering::Relaxed),
            distinct: self.distinct_total.load(Ordering::Relaxed),
            slow: self.slow_total.load(Ordering::Relaxed),
            backend_errors: self.backend_errors_total.load(Ordering::Relaxed),
        }
    }
}
