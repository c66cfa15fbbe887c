//! PostgreSQL handler: container configuration, readiness probe and connection.

use crate::connection::PostgresConnection;
use async_trait::async_trait;
use bench_container::{Container, ContainerRuntime, ContainerSpec, ReadinessProbe};
use bench_core::{ConnectionDescriptor, DatabaseHandler, Engine, HandlerError, SqlConnection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const CONTAINER_PORT: u16 = 5432;

/// PostgreSQL handler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresOptions {
    pub container_name: String,
    pub image: String,
    pub tag: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub cpu_limit: f64,
    pub memory_limit: String,
    pub batch_size: usize,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            container_name: "postgres-db".to_string(),
            image: "postgres".to_string(),
            tag: "17".to_string(),
            host: "localhost".to_string(),
            port: CONTAINER_PORT,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "testdb".to_string(),
            cpu_limit: 1.0,
            memory_limit: "2g".to_string(),
            batch_size: 1000,
        }
    }
}

pub struct PostgresHandler {
    options: PostgresOptions,
    container: Container,
}

impl PostgresHandler {
    pub fn new(options: PostgresOptions) -> Self {
        let spec = ContainerSpec::new(&options.image, &options.tag, &options.container_name)
            .with_env("POSTGRES_USER", &options.user)
            .with_env("POSTGRES_PASSWORD", &options.password)
            .with_env("POSTGRES_DB", &options.database)
            .with_port(CONTAINER_PORT, options.port)
            .with_cpu_limit(options.cpu_limit)
            .with_memory_limit(&options.memory_limit);
        Self {
            options,
            container: Container::new(spec),
        }
    }

    pub fn options(&self) -> &PostgresOptions {
        &self.options
    }
}

/// `pg_isready` against the TCP listener, which the init-phase server does not open.
pub struct PostgresProbe {
    user: String,
    database: String,
}

impl PostgresProbe {
    pub(crate) fn command(&self) -> Vec<String> {
        vec![
            "pg_isready".to_string(),
            "-h".to_string(),
            "127.0.0.1".to_string(),
            "-U".to_string(),
            self.user.clone(),
            "-d".to_string(),
            self.database.clone(),
        ]
    }
}

#[async_trait]
impl ReadinessProbe for PostgresProbe {
    async fn is_ready(&self, runtime: &dyn ContainerRuntime, container: &Container) -> bool {
        let Some(handle) = container.handle() else {
            return false;
        };
        match runtime.exec(handle, &self.command(), None).await {
            Ok(output) => output.success(),
            Err(e) => {
                debug!("PostgreSQL readiness check error: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl DatabaseHandler for PostgresHandler {
    fn engine(&self) -> Engine {
        Engine::PostgreSql
    }

    fn container(&self) -> &Container {
        &self.container
    }

    fn container_mut(&mut self) -> &mut Container {
        &mut self.container
    }

    fn readiness_probe(&self) -> Box<dyn ReadinessProbe> {
        Box::new(PostgresProbe {
            user: self.options.user.clone(),
            database: self.options.database.clone(),
        })
    }

    fn connection_descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor {
            scheme: "postgresql".to_string(),
            user: self.options.user.clone(),
            password: self.options.password.clone(),
            host: self.options.host.clone(),
            port: self.options.port,
            database: self.options.database.clone(),
        }
    }

    async fn open(
        &self,
        _runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Box<dyn SqlConnection>, HandlerError> {
        let url = self.connection_descriptor().to_url();
        let conn = PostgresConnection::connect(&url, self.options.batch_size)
            .await
            .map_err(|e| HandlerError::Connection(e.to_string()))?;
        Ok(Box::new(conn))
    }
}
