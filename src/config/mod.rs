//! Benchmark configuration loaded from YAML.

pub mod duration;

use anyhow::Context;
use bench_container::{Backoff, ReadinessPolicy, DEFAULT_DOCKER_SOCKET};
use bench_core::DEFAULT_TABLE;
use bench_engine_clickhouse::ClickHouseOptions;
use bench_engine_duckdb::{handler::IN_MEMORY, DuckDbOptions};
use bench_engine_mysql::MySqlOptions;
use bench_engine_postgresql::PostgresOptions;
use bench_framework::{ReadinessTimeoutPolicy, RunnerOptions};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level benchmark configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Host the mapped container ports are reachable on, for every handler.
    pub host: String,
    pub docker_socket: PathBuf,
    pub readiness: ReadinessConfig,
    pub load: LoadConfig,
    pub query_timeout_secs: Option<u64>,
    pub dataset: DatasetConfig,
    pub queries: PathBuf,
    pub output: PathBuf,
    /// Benchmarked in this order.
    pub handlers: Vec<HandlerConfig>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            docker_socket: PathBuf::from(DEFAULT_DOCKER_SOCKET),
            readiness: ReadinessConfig::default(),
            load: LoadConfig::default(),
            query_timeout_secs: None,
            dataset: DatasetConfig::default(),
            queries: PathBuf::from("queries.sql"),
            output: PathBuf::from("benchmark_results.csv"),
            handlers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub timeout_ms: u64,
    pub interval_ms: u64,
    pub backoff: BackoffKind,
    /// Multiplier for exponential backoff.
    pub backoff_factor: u32,
    /// Cap for exponential backoff.
    pub max_interval_ms: u64,
    pub on_timeout: ReadinessTimeoutPolicy,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            interval_ms: 1000,
            backoff: BackoffKind::Fixed,
            backoff_factor: 2,
            max_interval_ms: 10_000,
            on_timeout: ReadinessTimeoutPolicy::Proceed,
        }
    }
}

impl ReadinessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    }

    pub fn policy(&self) -> ReadinessPolicy {
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed,
            BackoffKind::Exponential => Backoff::Exponential {
                factor: self.backoff_factor,
                max: Duration::from_millis(self.max_interval_ms),
            },
        };
        ReadinessPolicy::new(Duration::from_millis(self.interval_ms), backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    pub table: String,
    /// Overrides every handler's own batch size when set.
    pub batch_size: Option<usize>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
            batch_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub path: PathBuf,
    pub has_header: bool,
    /// Column name to semantic type name; skips inference for those columns.
    pub column_types: BTreeMap<String, String>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data.csv"),
            has_header: true,
            column_types: BTreeMap::new(),
        }
    }
}

/// One benchmarked engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Key the handler's rows are reported under.
    pub name: String,
    #[serde(flatten)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "lowercase")]
pub enum EngineConfig {
    Mysql(MySqlOptions),
    Postgresql(PostgresOptions),
    Clickhouse(ClickHouseOptions),
    Duckdb(DuckDbOptions),
}

impl EngineConfig {
    fn container_name(&self) -> &str {
        match self {
            EngineConfig::Mysql(o) => &o.container_name,
            EngineConfig::Postgresql(o) => &o.container_name,
            EngineConfig::Clickhouse(o) => &o.container_name,
            EngineConfig::Duckdb(o) => &o.container_name,
        }
    }

    fn limits(&self) -> (f64, &str) {
        match self {
            EngineConfig::Mysql(o) => (o.cpu_limit, &o.memory_limit),
            EngineConfig::Postgresql(o) => (o.cpu_limit, &o.memory_limit),
            EngineConfig::Clickhouse(o) => (o.cpu_limit, &o.memory_limit),
            EngineConfig::Duckdb(o) => (o.cpu_limit, &o.memory_limit),
        }
    }
}

impl BenchConfig {
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: BenchConfig =
            serde_yaml::from_str(yaml).context("Failed to parse benchmark configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;
        Self::from_yaml(&yaml).with_context(|| format!("Invalid config file: {path:?}"))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.handlers.is_empty() {
            anyhow::bail!("No handlers configured");
        }
        if self.load.table.trim().is_empty() {
            anyhow::bail!("load.table must not be empty");
        }
        if self.load.batch_size == Some(0) {
            anyhow::bail!("load.batch_size must be positive");
        }

        let mut names = HashSet::new();
        let mut containers = HashSet::new();
        for handler in &self.handlers {
            if !names.insert(handler.name.as_str()) {
                anyhow::bail!("Duplicate handler name '{}'", handler.name);
            }
            let container = handler.engine.container_name();
            if !containers.insert(container) {
                anyhow::bail!(
                    "Container name '{}' is used by more than one handler",
                    container
                );
            }
            let (cpu, memory) = handler.engine.limits();
            if cpu.is_nan() || cpu <= 0.0 {
                anyhow::bail!("Handler '{}': cpu_limit must be positive", handler.name);
            }
            if !is_memory_limit(memory) {
                anyhow::bail!(
                    "Handler '{}': invalid memory_limit '{}' (expected e.g. 512m or 2g)",
                    handler.name,
                    memory
                );
            }
            if let EngineConfig::Duckdb(options) = &handler.engine {
                if options.database_path.trim() == IN_MEMORY {
                    anyhow::bail!(
                        "Handler '{}': DuckDB needs a database file, not {}",
                        handler.name,
                        IN_MEMORY
                    );
                }
            }
        }
        Ok(())
    }

    pub fn runner_options(&self) -> RunnerOptions {
        RunnerOptions {
            wait_timeout: self.readiness.timeout(),
            on_readiness_timeout: self.readiness.on_timeout,
            table: self.load.table.clone(),
            query_timeout: self.query_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// `<n>[b|k|m|g]`, as accepted by `docker run --memory`.
fn is_memory_limit(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    let digits = value.trim_end_matches(['b', 'k', 'm', 'g']);
    let suffix_len = value.len() - digits.len();
    suffix_len <= 1 && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
