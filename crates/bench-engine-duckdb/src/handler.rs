//! DuckDB handler: a Python container hosting the database file.

use crate::connection::DuckDbConnection;
use crate::driver::DriverMode;
use crate::error::DuckDbError;
use async_trait::async_trait;
use bench_container::{Container, ContainerRuntime, ContainerSpec, ReadinessProbe};
use bench_core::{ConnectionDescriptor, DatabaseHandler, Engine, HandlerError, SqlConnection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub const IN_MEMORY: &str = ":memory:";

/// DuckDB handler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckDbOptions {
    pub container_name: String,
    pub image: String,
    pub tag: String,
    /// Database file inside the container.
    pub database_path: String,
    pub cpu_limit: f64,
    pub memory_limit: String,
    /// Rows per `copy` request.
    pub chunk_rows: usize,
}

impl Default for DuckDbOptions {
    fn default() -> Self {
        Self {
            container_name: "duckdb-container".to_string(),
            image: "python".to_string(),
            tag: "3.11-slim".to_string(),
            database_path: "/tmp/bench.duckdb".to_string(),
            cpu_limit: 1.0,
            memory_limit: "1g".to_string(),
            chunk_rows: 100_000,
        }
    }
}

pub struct DuckDbHandler {
    options: DuckDbOptions,
    container: Container,
}

impl DuckDbHandler {
    /// The readiness check and the driver session are separate processes, so the
    /// database must be a file.
    pub fn new(options: DuckDbOptions) -> Result<Self, DuckDbError> {
        if options.database_path.trim() == IN_MEMORY {
            return Err(DuckDbError::InMemoryDatabase);
        }
        let spec = ContainerSpec::new(&options.image, &options.tag, &options.container_name)
            .with_command(["sh", "-c", "pip install duckdb && tail -f /dev/null"])
            .with_cpu_limit(options.cpu_limit)
            .with_memory_limit(&options.memory_limit);
        Ok(Self {
            options,
            container: Container::new(spec),
        })
    }

    pub fn options(&self) -> &DuckDbOptions {
        &self.options
    }
}

/// Opens the database file and runs `SELECT 1`; fails until `pip install` finished.
pub struct DuckDbProbe {
    path: String,
}

#[async_trait]
impl ReadinessProbe for DuckDbProbe {
    async fn is_ready(&self, runtime: &dyn ContainerRuntime, container: &Container) -> bool {
        let Some(handle) = container.handle() else {
            return false;
        };
        match runtime
            .exec(handle, &DriverMode::Ping.argv(&self.path), None)
            .await
        {
            Ok(output) => output.success(),
            Err(e) => {
                debug!("DuckDB readiness check error: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl DatabaseHandler for DuckDbHandler {
    fn engine(&self) -> Engine {
        Engine::DuckDb
    }

    fn container(&self) -> &Container {
        &self.container
    }

    fn container_mut(&mut self) -> &mut Container {
        &mut self.container
    }

    fn readiness_probe(&self) -> Box<dyn ReadinessProbe> {
        Box::new(DuckDbProbe {
            path: self.options.database_path.clone(),
        })
    }

    fn connection_descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor {
            scheme: "duckdb".to_string(),
            user: String::new(),
            password: String::new(),
            host: String::new(),
            port: 0,
            database: self.options.database_path.clone(),
        }
    }

    async fn open(
        &self,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Box<dyn SqlConnection>, HandlerError> {
        let handle = self
            .container
            .handle()
            .cloned()
            .ok_or_else(|| DuckDbError::NotStarted(self.container.name().to_string()))?;
        let session = runtime
            .open_session(&handle, &DriverMode::Serve.argv(&self.options.database_path))
            .await
            .map_err(DuckDbError::from)?;
        Ok(Box::new(DuckDbConnection::new(
            session,
            self.options.chunk_rows,
        )))
    }
}
