//! Benchmark orchestration: one handler at a time, one query at a time.

use crate::error::BenchmarkError;
use bench_container::{diff, snapshot, Container, ContainerLifecycle, LifecycleError, Readiness};
use bench_core::{
    BenchmarkRun, DatabaseHandler, Dataset, HandlerError, Query, QueryMetrics, SqlConnection,
    DEFAULT_TABLE,
};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// What to do when a container never passes its readiness probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessTimeoutPolicy {
    /// Warn and run the handler anyway.
    #[default]
    Proceed,
    /// Treat the timeout as a startup failure and skip the handler.
    Skip,
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub wait_timeout: Duration,
    pub on_readiness_timeout: ReadinessTimeoutPolicy,
    pub table: String,
    /// Per-query limit; a query exceeding it is recorded as failed.
    pub query_timeout: Option<Duration>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(30),
            on_readiness_timeout: ReadinessTimeoutPolicy::default(),
            table: DEFAULT_TABLE.to_string(),
            query_timeout: None,
        }
    }
}

/// Runs the query set against every handler, strictly sequentially.
pub struct BenchmarkRunner {
    lifecycle: ContainerLifecycle,
    options: RunnerOptions,
}

impl BenchmarkRunner {
    pub fn new(lifecycle: ContainerLifecycle) -> Self {
        Self {
            lifecycle,
            options: RunnerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Benchmark each handler in order and collect one row per (handler, query).
    ///
    /// A handler that fails to start or load contributes no rows. Its container is
    /// stopped and removed in every case, including a panic inside the handler.
    pub async fn run(
        &self,
        handlers: &mut [(String, Box<dyn DatabaseHandler>)],
        dataset: &Dataset,
        queries: &[Query],
    ) -> BenchmarkRun {
        let mut run = BenchmarkRun::new();
        info!(
            "Benchmarking {} handler(s) with {} queries on {} rows",
            handlers.len(),
            queries.len(),
            dataset.row_count()
        );

        for (name, handler) in handlers.iter_mut() {
            let name: &str = name;
            let span = info_span!("handler", name = %name, engine = %handler.engine());
            async {
                let started = Instant::now();
                let mut rows = Vec::new();
                let outcome = AssertUnwindSafe(self.benchmark_handler(
                    name,
                    handler.as_mut(),
                    dataset,
                    queries,
                    &mut rows,
                ))
                .catch_unwind()
                .await;

                match outcome {
                    Ok(Ok(())) => info!(
                        "Handler {} finished {} queries in {:?}",
                        name,
                        rows.len(),
                        started.elapsed()
                    ),
                    Ok(Err(e)) => error!("Skipping handler {} ({}): {}", name, e.kind(), e),
                    Err(_) => error!("Handler {} panicked; cleaning up", name),
                }

                self.cleanup(name, handler.container_mut()).await;
                for row in rows {
                    run.push(row);
                }
            }
            .instrument(span)
            .await;
        }

        run
    }

    async fn benchmark_handler(
        &self,
        name: &str,
        handler: &mut dyn DatabaseHandler,
        dataset: &Dataset,
        queries: &[Query],
        rows: &mut Vec<QueryMetrics>,
    ) -> Result<(), BenchmarkError> {
        let probe = handler.readiness_probe();
        let readiness = self
            .lifecycle
            .start(handler.container_mut(), probe.as_ref(), self.options.wait_timeout)
            .await?;
        if let Readiness::TimedOut { attempts } = readiness {
            match self.options.on_readiness_timeout {
                ReadinessTimeoutPolicy::Proceed => warn!(
                    "{} not ready after {} attempt(s); proceeding anyway",
                    name, attempts
                ),
                ReadinessTimeoutPolicy::Skip => {
                    return Err(LifecycleError::ReadinessTimeout {
                        name: handler.container().name().to_string(),
                        timeout: self.options.wait_timeout,
                    }
                    .into())
                }
            }
        }

        let mut conn = handler.open(self.lifecycle.runtime().clone()).await?;
        let handler: &dyn DatabaseHandler = handler;

        let loaded = handler
            .load_dataset(conn.as_mut(), dataset, &self.options.table)
            .await;
        let loaded = match loaded {
            Ok(count) => count,
            Err(e) => {
                close(conn).await;
                return Err(e.into());
            }
        };
        info!("Loaded {} rows into '{}'", loaded, self.options.table);

        for query in queries {
            let metrics = self
                .run_query(name, conn.as_mut(), handler, query)
                .await;
            rows.push(metrics);
        }

        close(conn).await;
        Ok(())
    }

    /// Execute one query inside its metrics bracket.
    async fn run_query(
        &self,
        name: &str,
        conn: &mut dyn SqlConnection,
        handler: &dyn DatabaseHandler,
        query: &Query,
    ) -> QueryMetrics {
        let runtime = self.lifecycle.runtime().as_ref();
        let container = handler.container();
        let before = snapshot(runtime, container).await;
        let started = Instant::now();
        let result = match self.options.query_timeout {
            Some(limit) => tokio::time::timeout(limit, conn.query(&query.text))
                .await
                .unwrap_or(Err(HandlerError::QueryTimeout(limit))),
            None => conn.query(&query.text).await,
        };
        let elapsed = started.elapsed();
        let after = snapshot(runtime, container).await;

        match result {
            Ok(result) => {
                let resources = diff(&before, &after);
                if resources.counter_reset {
                    warn!("Resource counters reset during query; deltas clamped to zero");
                }
                info!(
                    "Query returned {} rows in {:.2}ms: {}",
                    result.rows,
                    elapsed.as_secs_f64() * 1000.0,
                    query.text
                );
                for row in &result.sample {
                    debug!("  {}", row.join(" | "));
                }
                QueryMetrics::succeeded(query, name, elapsed, &resources, &result)
                    .in_dialect(handler.sql_dialect())
            }
            Err(e) => {
                error!("Query failed ({}): {}: {}", e.kind(), query.text, e);
                QueryMetrics::failed(query, name).in_dialect(handler.sql_dialect())
            }
        }
    }

    async fn cleanup(&self, name: &str, container: &mut Container) {
        if let Err(e) = self.lifecycle.stop(container, true).await {
            error!("Failed to clean up container for {}: {}", name, e);
        }
    }
}

async fn close(conn: Box<dyn SqlConnection>) {
    if let Err(e) = conn.close().await {
        warn!("Failed to close connection: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_container::testing::{FakeRuntime, RecordingSleeper};
    use bench_container::RawCounters;
    use bench_core::testing::FakeHandler;
    use bench_core::{Column, Engine, SemanticType, Value};
    use std::sync::Arc;

    fn dataset() -> Dataset {
        Dataset::new(
            vec![
                Column::new("id", SemanticType::Int64),
                Column::new("name", SemanticType::String),
            ],
            (0..4)
                .map(|i| vec![Value::Int(i), Value::Text(format!("row{i}"))])
                .collect(),
        )
        .unwrap()
    }

    fn queries() -> Vec<Query> {
        vec![
            Query::new("SELECT COUNT(*) FROM data;"),
            Query::new("SELEC broken"),
            Query::new("SELECT name FROM data"),
        ]
    }

    fn runner(runtime: &Arc<FakeRuntime>) -> BenchmarkRunner {
        let lifecycle = ContainerLifecycle::new(runtime.clone())
            .with_sleeper(Arc::new(RecordingSleeper::default()));
        BenchmarkRunner::new(lifecycle)
    }

    fn boxed(handler: FakeHandler) -> Box<dyn DatabaseHandler> {
        Box::new(handler)
    }

    #[tokio::test]
    async fn test_failed_query_is_isolated() {
        let runtime = Arc::new(FakeRuntime::new());
        let mut handlers = vec![
            (
                "a".to_string(),
                boxed(FakeHandler::new(Engine::MySql, "a-db").with_failing_statement("SELEC broken")),
            ),
            (
                "b".to_string(),
                boxed(
                    FakeHandler::new(Engine::PostgreSql, "b-db")
                        .with_failing_statement("SELEC broken"),
                ),
            ),
        ];

        let run = runner(&runtime).run(&mut handlers, &dataset(), &queries()).await;

        assert_eq!(run.len(), 6);
        let order: Vec<(&str, &str, bool)> = run
            .metrics()
            .iter()
            .map(|m| (m.engine.as_str(), m.query.as_str(), m.failed))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a", "SELECT COUNT(*) FROM data", false),
                ("a", "SELEC broken", true),
                ("a", "SELECT name FROM data", false),
                ("b", "SELECT COUNT(*) FROM data", false),
                ("b", "SELEC broken", true),
                ("b", "SELECT name FROM data", false),
            ]
        );
        let failed = &run.metrics()[1];
        assert_eq!(failed.original_query, "SELEC broken");
        assert_eq!(failed.execution_time_ms, 0.0);
        assert_eq!(failed.result_rows, 0);
        assert_eq!(run.metrics()[0].original_query, "SELECT COUNT(*) FROM data;");
        assert_eq!(run.metrics()[0].result_rows, 1);
    }

    #[tokio::test]
    async fn test_query_runs_as_written_and_is_recorded_per_dialect() {
        let runtime = Arc::new(FakeRuntime::new());
        let handler = FakeHandler::new(Engine::ClickHouse, "ch-db");
        let log = handler.log();
        let mut handlers = vec![("clickhouse".to_string(), boxed(handler))];
        let queries = vec![Query::new("select name\nfrom data where id>1;")];

        let run = runner(&runtime).run(&mut handlers, &dataset(), &queries).await;

        assert!(log
            .statements()
            .contains(&"QUERY select name\nfrom data where id>1".to_string()));
        let m = &run.metrics()[0];
        assert_eq!(m.query, "SELECT name FROM data WHERE id > 1");
        assert_eq!(m.original_query, "select name\nfrom data where id>1;");
    }

    #[tokio::test]
    async fn test_every_container_is_removed_after_run() {
        let runtime = Arc::new(FakeRuntime::new());
        let mut handlers = vec![
            ("ok".to_string(), boxed(FakeHandler::new(Engine::MySql, "ok-db"))),
            (
                "bad-load".to_string(),
                boxed(FakeHandler::new(Engine::ClickHouse, "bad-db").with_count_override(1)),
            ),
            (
                "no-conn".to_string(),
                boxed(FakeHandler::new(Engine::DuckDb, "noconn-db").failing_open()),
            ),
            (
                "panics".to_string(),
                boxed(FakeHandler::new(Engine::PostgreSql, "panic-db").panicking_load()),
            ),
        ];
        let runner = runner(&runtime);

        let run = runner.run(&mut handlers, &dataset(), &queries()).await;

        assert_eq!(run.engines(), vec!["ok"]);
        assert_eq!(runtime.container_count(), 0);
        for (_, handler) in handlers.iter_mut() {
            assert!(!runner
                .lifecycle
                .is_running(handler.container_mut())
                .await
                .unwrap());
        }
        assert_eq!(
            runtime.created_names(),
            vec!["ok-db", "bad-db", "noconn-db", "panic-db"]
        );
    }

    #[tokio::test]
    async fn test_container_that_refuses_to_stop_is_still_removed() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.fail_stop("stuck-db");
        let mut handlers = vec![
            ("stuck".to_string(), boxed(FakeHandler::new(Engine::MySql, "stuck-db"))),
            ("next".to_string(), boxed(FakeHandler::new(Engine::PostgreSql, "next-db"))),
        ];

        let run = runner(&runtime).run(&mut handlers, &dataset(), &queries()).await;

        assert_eq!(run.engines(), vec!["stuck", "next"]);
        assert_eq!(runtime.container_count(), 0);
        assert_eq!(runtime.remove_calls(), vec!["stuck-db", "next-db"]);
    }

    #[tokio::test]
    async fn test_load_failure_skips_queries() {
        let runtime = Arc::new(FakeRuntime::new());
        let handler = FakeHandler::new(Engine::MySql, "mysql-db").with_count_override(3);
        let log = handler.log();
        let mut handlers = vec![("mysql".to_string(), boxed(handler))];

        let run = runner(&runtime).run(&mut handlers, &dataset(), &queries()).await;

        assert!(run.is_empty());
        assert_eq!(
            log.statements(),
            vec!["LOAD data REPLACE 4", "COUNT SELECT COUNT(*) FROM data", "CLOSE"]
        );
        assert_eq!(runtime.remove_calls(), vec!["mysql-db"]);
    }

    #[tokio::test]
    async fn test_startup_failure_moves_to_next_handler() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.fail_create("first-db");
        let mut handlers = vec![
            ("first".to_string(), boxed(FakeHandler::new(Engine::MySql, "first-db"))),
            ("second".to_string(), boxed(FakeHandler::new(Engine::MySql, "second-db"))),
        ];

        let run = runner(&runtime).run(&mut handlers, &dataset(), &queries()).await;

        assert_eq!(run.engines(), vec!["second"]);
        assert_eq!(run.len(), 3);
        assert_eq!(runtime.container_count(), 0);
    }

    #[tokio::test]
    async fn test_readiness_timeout_policy() {
        let runtime = Arc::new(FakeRuntime::new());
        let options = RunnerOptions {
            wait_timeout: Duration::from_secs(2),
            ..RunnerOptions::default()
        };
        let mut handlers = vec![(
            "slow".to_string(),
            boxed(FakeHandler::new(Engine::MySql, "slow-db").never_ready()),
        )];

        let proceeding = runner(&runtime).with_options(options.clone());
        let run = proceeding.run(&mut handlers, &dataset(), &queries()).await;
        assert_eq!(run.len(), 3);

        let skipping = runner(&runtime).with_options(RunnerOptions {
            on_readiness_timeout: ReadinessTimeoutPolicy::Skip,
            ..options
        });
        let run = skipping.run(&mut handlers, &dataset(), &queries()).await;
        assert!(run.is_empty());
        assert_eq!(runtime.container_count(), 0);
    }

    #[tokio::test]
    async fn test_metrics_failure_still_records_query() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.fail_stats("stats-db");
        let mut handlers = vec![(
            "stats".to_string(),
            boxed(FakeHandler::new(Engine::MySql, "stats-db")),
        )];

        let run = runner(&runtime)
            .run(&mut handlers, &dataset(), &queries()[..1])
            .await;

        assert_eq!(run.len(), 1);
        let row = &run.metrics()[0];
        assert!(!row.failed);
        assert_eq!(row.cpu_usage_percent, 0.0);
        assert_eq!(row.memory_usage_mb, 0.0);
    }

    #[tokio::test]
    async fn test_resource_deltas_come_from_bracket() {
        let runtime = Arc::new(FakeRuntime::new());
        let before = RawCounters {
            memory_usage_bytes: 64 * 1024 * 1024,
            memory_limit_bytes: 256 * 1024 * 1024,
            block_bytes_read: 0,
            network_bytes_in: 1024 * 1024,
            ..RawCounters::zeroed()
        };
        let after = RawCounters {
            block_bytes_read: 2 * 1024 * 1024,
            network_bytes_in: 3 * 1024 * 1024,
            ..before
        };
        runtime.push_stats("net-db", before);
        runtime.push_stats("net-db", after);
        let mut handlers = vec![(
            "net".to_string(),
            boxed(FakeHandler::new(Engine::MySql, "net-db")),
        )];

        let run = runner(&runtime)
            .run(&mut handlers, &dataset(), &queries()[..1])
            .await;

        let row = &run.metrics()[0];
        assert_eq!(row.disk_read_mb, 2.0);
        assert_eq!(row.network_in_mb, 2.0);
        assert_eq!(row.memory_usage_mb, 64.0);
        assert_eq!(row.memory_usage_percent, 25.0);
    }
}
