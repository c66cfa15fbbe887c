//! Test doubles: a connection that records statements and a handler built on it.

use crate::connection::{LoadMode, QueryResult, SqlConnection, SAMPLE_ROWS};
use crate::dataset::Dataset;
use crate::error::HandlerError;
use crate::handler::{replace_load, ConnectionDescriptor, DatabaseHandler, Engine};
use async_trait::async_trait;
use bench_container::testing::ScriptedProbe;
use bench_container::{Container, ContainerRuntime, ContainerSpec, ReadinessProbe};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

/// Shared, cloneable log of the statements a connection received.
#[derive(Debug, Clone, Default)]
pub struct ConnectionLog(Arc<Mutex<Vec<String>>>);

impl ConnectionLog {
    pub fn statements(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn push(&self, entry: String) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

/// In-memory [`SqlConnection`] that records every call.
///
/// Entries look like `EXECUTE <sql>`, `QUERY <sql>`, `COUNT <sql>`,
/// `LOAD <table> REPLACE|APPEND <rows>` and `CLOSE`.
#[derive(Debug, Default)]
pub struct RecordingConnection {
    log: ConnectionLog,
    tables: HashMap<String, u64>,
    failing: HashSet<String>,
    failing_load: bool,
    count_override: Option<u64>,
    query_rows: u64,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self {
            query_rows: 1,
            ..Self::default()
        }
    }

    pub fn with_log(mut self, log: ConnectionLog) -> Self {
        self.log = log;
        self
    }

    /// `execute` or `query` of exactly this statement fails.
    pub fn with_failing_statement(mut self, statement: impl Into<String>) -> Self {
        self.failing.insert(statement.into());
        self
    }

    pub fn with_failing_load(mut self) -> Self {
        self.failing_load = true;
        self
    }

    /// `COUNT(*)` reports this value whatever was loaded.
    pub fn with_count_override(mut self, count: u64) -> Self {
        self.count_override = Some(count);
        self
    }

    pub fn with_query_rows(mut self, rows: u64) -> Self {
        self.query_rows = rows;
        self
    }

    pub fn log(&self) -> ConnectionLog {
        self.log.clone()
    }

    fn check(&self, statement: &str) -> Result<(), HandlerError> {
        if self.failing.contains(statement) {
            return Err(HandlerError::QueryExecution(format!(
                "syntax error at or near \"{statement}\""
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SqlConnection for RecordingConnection {
    async fn execute(&mut self, statement: &str) -> Result<(), HandlerError> {
        self.log.push(format!("EXECUTE {statement}"));
        self.check(statement)
    }

    async fn query(&mut self, statement: &str) -> Result<QueryResult, HandlerError> {
        self.log.push(format!("QUERY {statement}"));
        self.check(statement)?;
        let sample = (0..self.query_rows.min(SAMPLE_ROWS as u64))
            .map(|i| vec![i.to_string()])
            .collect();
        Ok(QueryResult {
            rows: self.query_rows,
            size_bytes: self.query_rows * 8,
            sample,
        })
    }

    async fn query_count(&mut self, statement: &str) -> Result<u64, HandlerError> {
        self.log.push(format!("COUNT {statement}"));
        self.check(statement)?;
        if let Some(count) = self.count_override {
            return Ok(count);
        }
        let table = statement.split_whitespace().last().unwrap_or_default();
        Ok(self.tables.get(table).copied().unwrap_or(0))
    }

    async fn bulk_load(
        &mut self,
        table: &str,
        dataset: &Dataset,
        mode: LoadMode,
    ) -> Result<u64, HandlerError> {
        let rows = dataset.row_count();
        let label = match mode {
            LoadMode::Replace => "REPLACE",
            LoadMode::Append => "APPEND",
        };
        self.log.push(format!("LOAD {table} {label} {rows}"));
        if self.failing_load {
            return Err(HandlerError::QueryExecution(
                "connection reset during load".to_string(),
            ));
        }
        let entry = self.tables.entry(table.to_string()).or_insert(0);
        match mode {
            LoadMode::Replace => *entry = rows,
            LoadMode::Append => *entry += rows,
        }
        Ok(rows)
    }

    async fn close(self: Box<Self>) -> Result<(), HandlerError> {
        self.log.push("CLOSE".to_string());
        Ok(())
    }
}

/// [`DatabaseHandler`] over a [`RecordingConnection`], for orchestrator tests.
pub struct FakeHandler {
    engine: Engine,
    container: Container,
    ready: bool,
    log: ConnectionLog,
    failing: Vec<String>,
    count_override: Option<u64>,
    failing_open: bool,
    panicking_load: bool,
}

impl FakeHandler {
    pub fn new(engine: Engine, container_name: &str) -> Self {
        Self {
            engine,
            container: Container::new(ContainerSpec::new("fake", "latest", container_name)),
            ready: true,
            log: ConnectionLog::default(),
            failing: Vec::new(),
            count_override: None,
            failing_open: false,
            panicking_load: false,
        }
    }

    pub fn with_failing_statement(mut self, statement: impl Into<String>) -> Self {
        self.failing.push(statement.into());
        self
    }

    pub fn with_count_override(mut self, count: u64) -> Self {
        self.count_override = Some(count);
        self
    }

    pub fn never_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.failing_open = true;
        self
    }

    pub fn panicking_load(mut self) -> Self {
        self.panicking_load = true;
        self
    }

    pub fn log(&self) -> ConnectionLog {
        self.log.clone()
    }
}

#[async_trait]
impl DatabaseHandler for FakeHandler {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn container(&self) -> &Container {
        &self.container
    }

    fn container_mut(&mut self) -> &mut Container {
        &mut self.container
    }

    fn readiness_probe(&self) -> Box<dyn ReadinessProbe> {
        Box::new(ScriptedProbe::always(self.ready))
    }

    fn connection_descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor {
            scheme: "fake".to_string(),
            user: "user".to_string(),
            password: "password".to_string(),
            host: "localhost".to_string(),
            port: 1,
            database: "testdb".to_string(),
        }
    }

    async fn open(
        &self,
        _runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Box<dyn SqlConnection>, HandlerError> {
        if self.failing_open {
            return Err(HandlerError::Connection("connection refused".to_string()));
        }
        let mut conn = RecordingConnection::new().with_log(self.log.clone());
        for statement in &self.failing {
            conn = conn.with_failing_statement(statement.clone());
        }
        if let Some(count) = self.count_override {
            conn = conn.with_count_override(count);
        }
        Ok(Box::new(conn))
    }

    async fn load_dataset(
        &self,
        conn: &mut dyn SqlConnection,
        dataset: &Dataset,
        table: &str,
    ) -> Result<u64, HandlerError> {
        if self.panicking_load {
            panic!("loader crashed");
        }
        replace_load(conn, dataset, table).await
    }
}
