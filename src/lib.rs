//! db-bench: run the same SQL queries against several database engines in
//! Docker containers and compare execution time and resource usage.
//!
//! The binary reads a YAML [`config::BenchConfig`], loads a CSV dataset and a
//! query file, benchmarks every configured engine one after another and writes
//! one CSV row per (engine, query).

pub mod config;
pub mod dataset;
pub mod handlers;
pub mod queries;

use anyhow::Context;
use bench_container::ContainerLifecycle;
use bench_core::BenchmarkRun;
use bench_framework::{write_csv, BenchmarkRunner};
use config::BenchConfig;
use handlers::NamedHandler;
use tracing::info;

/// Load inputs, benchmark `handlers` and write the CSV report.
pub async fn run_benchmark(
    config: &BenchConfig,
    lifecycle: ContainerLifecycle,
    handlers: &mut [NamedHandler],
) -> anyhow::Result<BenchmarkRun> {
    let dataset = dataset::load_dataset(&config.dataset)?;
    let queries = queries::load_queries(&config.queries)?;

    let runner = BenchmarkRunner::new(lifecycle.with_policy(config.readiness.policy()))
        .with_options(config.runner_options());
    let run = runner.run(handlers, &dataset, &queries).await;

    write_csv(&config.output, &run)
        .with_context(|| format!("Failed to write results to {:?}", config.output))?;
    info!(
        "Benchmark finished: {} result rows from {} engine(s)",
        run.len(),
        run.engines().len()
    );
    Ok(run)
}
