//! CSV report and summary rendering.

use crate::error::ReportError;
use crate::summary::Summary;
use bench_core::{BenchmarkRun, QueryMetrics};
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use std::path::Path;
use tracing::info;

/// Header of the CSV report, one column per [`QueryMetrics`] field.
pub const CSV_COLUMNS: [&str; 14] = [
    "query",
    "original_query",
    "engine",
    "execution_time_ms",
    "cpu_usage_percent",
    "memory_usage_mb",
    "memory_usage_percent",
    "disk_read_mb",
    "disk_write_mb",
    "network_in_mb",
    "network_out_mb",
    "result_rows",
    "result_size_mb",
    "failed",
];

/// Write every row of `run` to `path`; the header is written even for an empty run.
pub fn write_csv(path: &Path, run: &BenchmarkRun) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(CSV_COLUMNS)?;
    for metrics in run.metrics() {
        writer.serialize(metrics)?;
    }
    writer.flush()?;
    info!("Wrote {} result rows to {}", run.len(), path.display());
    Ok(())
}

/// Read a report written by [`write_csv`].
pub fn read_csv(path: &Path) -> Result<BenchmarkRun, ReportError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    if !headers.iter().eq(CSV_COLUMNS) {
        return Err(ReportError::Header(headers.iter().collect::<Vec<_>>().join(",")));
    }
    let metrics = reader
        .deserialize::<QueryMetrics>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(BenchmarkRun::from(metrics))
}

fn ms(value: f64) -> String {
    format!("{value:.2}")
}

/// Render `summary` as tables for the terminal.
pub fn render_summary(summary: &Summary) -> String {
    let mut output = String::new();

    let mut engines = Table::new();
    engines.load_preset(UTF8_FULL);
    engines.set_header(vec![
        "Engine",
        "OK",
        "Failed",
        "Mean ms",
        "Min ms",
        "Max ms",
        "Mean CPU %",
        "Mean mem MB",
        "Disk read MB",
        "Disk write MB",
    ]);
    for e in &summary.engines {
        let (mean, min, max) = match &e.timing {
            Some(t) => (ms(t.mean_ms), ms(t.min_ms), ms(t.max_ms)),
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };
        let failed = if e.failed > 0 {
            Cell::new(e.failed).fg(Color::Red)
        } else {
            Cell::new(e.failed)
        };
        engines.add_row(vec![
            Cell::new(&e.engine),
            Cell::new(e.succeeded).fg(Color::Green),
            failed,
            Cell::new(mean),
            Cell::new(min),
            Cell::new(max),
            Cell::new(format!("{:.1}", e.mean_cpu_percent)),
            Cell::new(format!("{:.1}", e.mean_memory_mb)),
            Cell::new(format!("{:.2}", e.total_disk_read_mb)),
            Cell::new(format!("{:.2}", e.total_disk_write_mb)),
        ]);
    }
    output.push_str(&engines.to_string());
    output.push('\n');

    if !summary.fastest.is_empty() {
        let mut fastest = Table::new();
        fastest.load_preset(UTF8_FULL);
        fastest.set_header(vec!["Query", "Fastest engine", "ms"]);
        for w in &summary.fastest {
            fastest.add_row(vec![
                Cell::new(&w.query),
                Cell::new(&w.engine).fg(Color::Cyan),
                Cell::new(ms(w.execution_time_ms)),
            ]);
        }
        output.push_str("\nFastest engine per query:\n");
        output.push_str(&fastest.to_string());
        output.push('\n');
    }

    if !summary.universally_failed.is_empty() {
        output.push_str("\nFailed on every engine:\n");
        for query in &summary.universally_failed {
            output.push_str(&format!("  {query}\n"));
        }
    }

    output
}
