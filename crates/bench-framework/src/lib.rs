//! Benchmark orchestration for db-bench.
//!
//! [`BenchmarkRunner`] drives the handlers one after another, [`summarize`]
//! aggregates the resulting [`BenchmarkRun`](bench_core::BenchmarkRun) and the
//! `report` module writes, reads and renders it.

pub mod error;
pub mod orchestrator;
pub mod report;
pub mod summary;

pub use error::{BenchmarkError, ReportError};
pub use orchestrator::{BenchmarkRunner, ReadinessTimeoutPolicy, RunnerOptions};
pub use report::{read_csv, render_summary, write_csv, CSV_COLUMNS};
pub use summary::{summarize, EngineSummary, QueryWinner, Summary, Timing};
