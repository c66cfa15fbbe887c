//! Benchmarks against real containers. Needs a local Docker daemon and pulls images:
//! `cargo test --test live_engines -- --ignored --test-threads=1`

use bench_container::{ContainerLifecycle, DockerCli};
use bench_core::{Column, DatabaseHandler, Dataset, Query, SemanticType, Value};
use bench_engine_clickhouse::{ClickHouseHandler, ClickHouseOptions};
use bench_engine_duckdb::{DuckDbHandler, DuckDbOptions};
use bench_engine_mysql::{MySqlHandler, MySqlOptions};
use bench_engine_postgresql::{PostgresHandler, PostgresOptions};
use bench_framework::{BenchmarkRunner, RunnerOptions};
use std::sync::Arc;
use std::time::Duration;

fn dataset() -> Dataset {
    Dataset::new(
        vec![
            Column::new("id", SemanticType::Int64),
            Column::new("city", SemanticType::String),
            Column::new("fare", SemanticType::Float64),
        ],
        (0..250)
            .map(|i| {
                vec![
                    Value::Int(i),
                    Value::Text(["Lisbon", "Porto", "Faro"][i as usize % 3].to_string()),
                    if i % 10 == 0 {
                        Value::Null
                    } else {
                        Value::Float(i as f64 / 4.0)
                    },
                ]
            })
            .collect(),
    )
    .unwrap()
}

async fn benchmark(name: &str, handler: Box<dyn DatabaseHandler>) {
    let lifecycle = ContainerLifecycle::new(Arc::new(DockerCli::new()));
    let runner = BenchmarkRunner::new(lifecycle).with_options(RunnerOptions {
        wait_timeout: Duration::from_secs(120),
        ..RunnerOptions::default()
    });
    let queries = vec![
        Query::new("SELECT COUNT(*) FROM data"),
        Query::new("SELECT city, COUNT(*) FROM data GROUP BY city"),
    ];
    let mut handlers = vec![(name.to_string(), handler)];

    let run = runner.run(&mut handlers, &dataset(), &queries).await;

    assert_eq!(run.len(), 2, "{name} produced no rows");
    assert!(run.metrics().iter().all(|m| !m.failed));
    assert_eq!(run.metrics()[0].result_rows, 1);
    assert_eq!(run.metrics()[1].result_rows, 3);
}

#[tokio::test]
#[ignore]
async fn test_mysql_live() {
    let options = MySqlOptions {
        port: 23306,
        ..MySqlOptions::default()
    };
    benchmark("mysql", Box::new(MySqlHandler::new(options))).await;
}

#[tokio::test]
#[ignore]
async fn test_postgresql_live() {
    let options = PostgresOptions {
        port: 25432,
        ..PostgresOptions::default()
    };
    benchmark("postgresql", Box::new(PostgresHandler::new(options))).await;
}

#[tokio::test]
#[ignore]
async fn test_clickhouse_live() {
    let options = ClickHouseOptions {
        http_port: 28123,
        native_port: 29000,
        ..ClickHouseOptions::default()
    };
    benchmark("clickhouse", Box::new(ClickHouseHandler::new(options))).await;
}

#[tokio::test]
#[ignore]
async fn test_duckdb_live() {
    let handler = DuckDbHandler::new(DuckDbOptions::default()).unwrap();
    benchmark("duckdb", Box::new(handler)).await;
}
