//! Command-line interface for db-bench
//!
//! # Usage Examples
//!
//! ```bash
//! # Benchmark every handler in the config
//! db-bench run --config bench.yaml
//!
//! # Override inputs and the readiness wait
//! db-bench run --config bench.yaml \
//!   --dataset demos/data.csv \
//!   --queries demos/queries.sql \
//!   --wait-timeout 2m
//!
//! # Re-print the summary of an earlier run
//! db-bench summarize --results benchmark_results.csv
//!
//! # Check a config without starting containers
//! db-bench validate --config bench.yaml
//! ```

use anyhow::Context;
use bench_container::{ContainerLifecycle, DockerCli};
use bench_framework::{read_csv, render_summary, summarize};
use clap::{Parser, Subcommand};
use db_bench::config::duration::parse_duration;
use db_bench::config::BenchConfig;
use db_bench::handlers::build_handlers;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "db-bench")]
#[command(about = "Benchmark SQL queries across MySQL, PostgreSQL, ClickHouse and DuckDB")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start each configured engine, load the dataset and time every query
    Run {
        /// Benchmark configuration (YAML)
        #[arg(long, env = "DB_BENCH_CONFIG", default_value = "bench.yaml")]
        config: PathBuf,

        /// CSV dataset, overrides `dataset.path`
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Query file, overrides `queries`
        #[arg(long)]
        queries: Option<PathBuf>,

        /// Results CSV, overrides `output`
        #[arg(long)]
        output: Option<PathBuf>,

        /// How long to wait for each engine to accept connections (e.g. 30s, 2m)
        #[arg(long, value_parser = parse_duration)]
        wait_timeout: Option<Duration>,
    },

    /// Print the summary table for an existing results CSV
    Summarize {
        #[arg(long, default_value = "benchmark_results.csv")]
        results: PathBuf,
    },

    /// Parse and validate a configuration
    Validate {
        #[arg(long, env = "DB_BENCH_CONFIG", default_value = "bench.yaml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            dataset,
            queries,
            output,
            wait_timeout,
        } => {
            let mut config = BenchConfig::from_file(&config)?;
            if let Some(path) = dataset {
                config.dataset.path = path;
            }
            if let Some(path) = queries {
                config.queries = path;
            }
            if let Some(path) = output {
                config.output = path;
            }
            if let Some(timeout) = wait_timeout {
                config.readiness.set_timeout(timeout);
            }
            run_benchmark(config).await?;
        }
        Commands::Summarize { results } => {
            let run = read_csv(&results)
                .with_context(|| format!("Failed to read results from {results:?}"))?;
            println!("{}", render_summary(&summarize(&run)));
        }
        Commands::Validate { config } => {
            let config = BenchConfig::from_file(&config)?;
            let handlers = build_handlers(&config)?;
            for (name, handler) in &handlers {
                let descriptor = handler.connection_descriptor();
                println!(
                    "{name}: {} in container '{}', database '{}' on {}:{}",
                    handler.engine(),
                    handler.container().name(),
                    descriptor.database,
                    descriptor.host,
                    descriptor.port
                );
            }
            println!("Configuration OK: {} handler(s)", handlers.len());
        }
    }

    Ok(())
}

async fn run_benchmark(config: BenchConfig) -> anyhow::Result<()> {
    let mut handlers = build_handlers(&config)?;
    let runtime = Arc::new(DockerCli::with_socket(&config.docker_socket));
    let lifecycle = ContainerLifecycle::new(runtime);

    info!(
        "Benchmarking {} handler(s), results go to {:?}",
        handlers.len(),
        config.output
    );
    let run = db_bench::run_benchmark(&config, lifecycle, &mut handlers).await?;
    println!("{}", render_summary(&summarize(&run)));
    Ok(())
}
