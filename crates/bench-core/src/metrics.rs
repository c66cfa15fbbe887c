//! Per-query metrics and the run that collects them.

use crate::connection::QueryResult;
use crate::query::{Query, SqlDialect};
use bench_container::{ResourceMetrics, BYTES_PER_MIB};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Measurements of one (handler, query) attempt.
///
/// Field order is the column order of the CSV report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub query: String,
    pub original_query: String,
    pub engine: String,
    pub execution_time_ms: f64,
    pub cpu_usage_percent: f64,
    pub memory_usage_mb: f64,
    pub memory_usage_percent: f64,
    pub disk_read_mb: f64,
    pub disk_write_mb: f64,
    pub network_in_mb: f64,
    pub network_out_mb: f64,
    pub result_rows: u64,
    pub result_size_mb: f64,
    pub failed: bool,
}

impl QueryMetrics {
    /// A successful attempt.
    pub fn succeeded(
        query: &Query,
        engine: &str,
        elapsed: Duration,
        resources: &ResourceMetrics,
        result: &QueryResult,
    ) -> Self {
        Self {
            query: query.text.clone(),
            original_query: query.original.clone(),
            engine: engine.to_string(),
            execution_time_ms: elapsed.as_secs_f64() * 1000.0,
            cpu_usage_percent: resources.cpu_percent,
            memory_usage_mb: resources.memory_usage_mb,
            memory_usage_percent: resources.memory_percent,
            disk_read_mb: resources.disk_read_mb,
            disk_write_mb: resources.disk_write_mb,
            network_in_mb: resources.network_in_mb,
            network_out_mb: resources.network_out_mb,
            result_rows: result.rows,
            result_size_mb: result.size_bytes as f64 / BYTES_PER_MIB,
            failed: false,
        }
    }

    /// Record the query text as rendered in `dialect`.
    pub fn in_dialect(mut self, dialect: SqlDialect) -> Self {
        self.query = dialect.normalize(&self.query);
        self
    }

    /// A failed attempt: same query text, every performance field zero.
    pub fn failed(query: &Query, engine: &str) -> Self {
        Self {
            query: query.text.clone(),
            original_query: query.original.clone(),
            engine: engine.to_string(),
            execution_time_ms: 0.0,
            cpu_usage_percent: 0.0,
            memory_usage_mb: 0.0,
            memory_usage_percent: 0.0,
            disk_read_mb: 0.0,
            disk_write_mb: 0.0,
            network_in_mb: 0.0,
            network_out_mb: 0.0,
            result_rows: 0,
            result_size_mb: 0.0,
            failed: true,
        }
    }
}

/// All metrics of one benchmark run, in execution order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenchmarkRun {
    metrics: Vec<QueryMetrics>,
}

impl BenchmarkRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metrics: QueryMetrics) {
        self.metrics.push(metrics);
    }

    pub fn metrics(&self) -> &[QueryMetrics] {
        &self.metrics
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Engine names in order of first appearance.
    pub fn engines(&self) -> Vec<&str> {
        let mut engines: Vec<&str> = Vec::new();
        for m in &self.metrics {
            if !engines.contains(&m.engine.as_str()) {
                engines.push(&m.engine);
            }
        }
        engines
    }

    pub fn into_metrics(self) -> Vec<QueryMetrics> {
        self.metrics
    }
}

impl From<Vec<QueryMetrics>> for BenchmarkRun {
    fn from(metrics: Vec<QueryMetrics>) -> Self {
        Self { metrics }
    }
}
