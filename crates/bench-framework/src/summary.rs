//! Aggregation of a benchmark run into per-engine and per-query results.

use bench_core::{BenchmarkRun, QueryMetrics};

/// Timing statistics over successful queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSummary {
    pub engine: String,
    pub succeeded: usize,
    pub failed: usize,
    /// `None` when no query succeeded.
    pub timing: Option<Timing>,
    pub mean_cpu_percent: f64,
    pub mean_memory_mb: f64,
    pub total_disk_read_mb: f64,
    pub total_disk_write_mb: f64,
}

/// Fastest successful engine for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryWinner {
    pub query: String,
    pub engine: String,
    pub execution_time_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub engines: Vec<EngineSummary>,
    /// In order of first appearance; queries no engine ran successfully are absent.
    pub fastest: Vec<QueryWinner>,
    /// Queries that failed on every engine of the run.
    pub universally_failed: Vec<String>,
}

/// Aggregate `run`; engines and queries keep their order of first appearance.
pub fn summarize(run: &BenchmarkRun) -> Summary {
    let engine_names = run.engines();
    let engines = engine_names
        .iter()
        .map(|engine| summarize_engine(engine, run.metrics()))
        .collect();

    // Rows of one query share its source text; `query` is rendered per engine.
    let mut originals: Vec<&str> = Vec::new();
    for m in run.metrics() {
        if !originals.contains(&m.original_query.as_str()) {
            originals.push(&m.original_query);
        }
    }

    let mut fastest = Vec::new();
    let mut universally_failed = Vec::new();
    for original in originals {
        let rows: Vec<&QueryMetrics> = run
            .metrics()
            .iter()
            .filter(|m| m.original_query == original)
            .collect();
        let text = rows.first().map(|m| m.query.as_str()).unwrap_or(original);

        let mut winner: Option<&QueryMetrics> = None;
        for m in rows.iter().filter(|m| !m.failed) {
            // Strictly faster only, so ties keep the earlier engine.
            let faster = match winner {
                Some(w) => m.execution_time_ms < w.execution_time_ms,
                None => true,
            };
            if faster {
                winner = Some(m);
            }
        }
        if let Some(w) = winner {
            fastest.push(QueryWinner {
                query: text.to_string(),
                engine: w.engine.clone(),
                execution_time_ms: w.execution_time_ms,
            });
        }

        // A repeated query counts once per engine, and any success rules it out.
        let mut failed_on: Vec<&str> = Vec::new();
        for m in rows.iter().filter(|m| m.failed) {
            if !failed_on.contains(&m.engine.as_str()) {
                failed_on.push(&m.engine);
            }
        }
        if winner.is_none() && !failed_on.is_empty() && failed_on.len() == engine_names.len() {
            universally_failed.push(text.to_string());
        }
    }

    Summary {
        engines,
        fastest,
        universally_failed,
    }
}

fn summarize_engine(engine: &str, metrics: &[QueryMetrics]) -> EngineSummary {
    let rows: Vec<&QueryMetrics> = metrics.iter().filter(|m| m.engine == engine).collect();
    let ok: Vec<&QueryMetrics> = rows.iter().copied().filter(|m| !m.failed).collect();
    let n = ok.len() as f64;

    let timing = (!ok.is_empty()).then(|| Timing {
        mean_ms: ok.iter().map(|m| m.execution_time_ms).sum::<f64>() / n,
        min_ms: ok
            .iter()
            .map(|m| m.execution_time_ms)
            .fold(f64::INFINITY, f64::min),
        max_ms: ok
            .iter()
            .map(|m| m.execution_time_ms)
            .fold(f64::NEG_INFINITY, f64::max),
    });
    let mean = |f: fn(&QueryMetrics) -> f64| {
        if ok.is_empty() {
            0.0
        } else {
            ok.iter().map(|m| f(m)).sum::<f64>() / n
        }
    };

    EngineSummary {
        engine: engine.to_string(),
        succeeded: ok.len(),
        failed: rows.len() - ok.len(),
        timing,
        mean_cpu_percent: mean(|m| m.cpu_usage_percent),
        mean_memory_mb: mean(|m| m.memory_usage_mb),
        total_disk_read_mb: ok.iter().map(|m| m.disk_read_mb).sum(),
        total_disk_write_mb: ok.iter().map(|m| m.disk_write_mb).sum(),
    }
}
