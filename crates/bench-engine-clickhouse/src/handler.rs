//! ClickHouse handler: container configuration, HTTP readiness probe and the
//! create-then-append load strategy.

use crate::client::ClickHouseClient;
use crate::connection::ClickHouseConnection;
use crate::ddl::ClickHouseDdl;
use async_trait::async_trait;
use bench_container::{Container, ContainerRuntime, ContainerSpec, ReadinessProbe};
use bench_core::{
    verify_row_count, ConnectionDescriptor, DatabaseHandler, Dataset, DatasetLoadError, Engine,
    HandlerError, LoadMode, SqlConnection, ToDdl,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

const HTTP_PORT: u16 = 8123;
const NATIVE_PORT: u16 = 9000;

/// ClickHouse handler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickHouseOptions {
    pub container_name: String,
    pub image: String,
    pub tag: String,
    pub host: String,
    /// Host port mapped to the HTTP interface.
    pub http_port: u16,
    /// Host port mapped to the native protocol.
    pub native_port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub cpu_limit: f64,
    pub memory_limit: String,
    /// Rows per `JSONEachRow` request.
    pub batch_size: usize,
}

impl Default for ClickHouseOptions {
    fn default() -> Self {
        Self {
            container_name: "clickhouse-db".to_string(),
            image: "clickhouse/clickhouse-server".to_string(),
            tag: "latest".to_string(),
            host: "localhost".to_string(),
            http_port: HTTP_PORT,
            native_port: NATIVE_PORT,
            user: "default".to_string(),
            password: "clickhouse".to_string(),
            database: "default".to_string(),
            cpu_limit: 2.0,
            memory_limit: "4g".to_string(),
            batch_size: 1000,
        }
    }
}

pub struct ClickHouseHandler {
    options: ClickHouseOptions,
    container: Container,
}

impl ClickHouseHandler {
    pub fn new(options: ClickHouseOptions) -> Self {
        let spec = ContainerSpec::new(&options.image, &options.tag, &options.container_name)
            .with_env("CLICKHOUSE_USER", &options.user)
            .with_env("CLICKHOUSE_PASSWORD", &options.password)
            .with_env("CLICKHOUSE_DB", &options.database)
            .with_env("CLICKHOUSE_DEFAULT_ACCESS_MANAGEMENT", "1")
            .with_port(HTTP_PORT, options.http_port)
            .with_port(NATIVE_PORT, options.native_port)
            .with_cpu_limit(options.cpu_limit)
            .with_memory_limit(&options.memory_limit);
        Self {
            options,
            container: Container::new(spec),
        }
    }

    pub fn options(&self) -> &ClickHouseOptions {
        &self.options
    }

    fn client(&self) -> Result<ClickHouseClient, HandlerError> {
        ClickHouseClient::new(
            &self.options.host,
            self.options.http_port,
            &self.options.user,
            &self.options.password,
            &self.options.database,
        )
        .map_err(|e| HandlerError::Connection(e.to_string()))
    }
}

/// Posts `SELECT 1` to the HTTP interface.
pub struct ClickHouseProbe {
    client: Option<ClickHouseClient>,
}

#[async_trait]
impl ReadinessProbe for ClickHouseProbe {
    async fn is_ready(&self, _runtime: &dyn ContainerRuntime, container: &Container) -> bool {
        let (Some(client), Some(_)) = (&self.client, container.handle()) else {
            return false;
        };
        match client.query("SELECT 1").await {
            Ok(_) => true,
            Err(e) => {
                debug!("ClickHouse readiness check error: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl DatabaseHandler for ClickHouseHandler {
    fn engine(&self) -> Engine {
        Engine::ClickHouse
    }

    fn container(&self) -> &Container {
        &self.container
    }

    fn container_mut(&mut self) -> &mut Container {
        &mut self.container
    }

    fn readiness_probe(&self) -> Box<dyn ReadinessProbe> {
        Box::new(ClickHouseProbe {
            client: self.client().ok(),
        })
    }

    fn connection_descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor {
            scheme: "clickhouse".to_string(),
            user: self.options.user.clone(),
            password: self.options.password.clone(),
            host: self.options.host.clone(),
            port: self.options.http_port,
            database: self.options.database.clone(),
        }
    }

    async fn open(
        &self,
        _runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Box<dyn SqlConnection>, HandlerError> {
        let client = self.client()?;
        client
            .query("SELECT 1")
            .await
            .map_err(|e| HandlerError::Connection(e.to_string()))?;
        Ok(Box::new(ClickHouseConnection::new(
            client,
            self.options.batch_size,
        )))
    }

    /// MergeTree tables need an engine clause, so the table is created explicitly
    /// and rows are appended to it.
    async fn load_dataset(
        &self,
        conn: &mut dyn SqlConnection,
        dataset: &Dataset,
        table: &str,
    ) -> Result<u64, HandlerError> {
        let create = ClickHouseDdl.create_table(table, dataset.columns())?;
        conn.execute(&create)
            .await
            .map_err(|e| DatasetLoadError::Ddl {
                table: table.to_string(),
                message: e.to_string(),
            })?;
        info!("Created table '{}'", table);

        conn.bulk_load(table, dataset, LoadMode::Append)
            .await
            .map_err(|e| e.into_load_error(table))?;
        verify_row_count(conn, table, dataset.row_count()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_container::testing::FakeRuntime;
    use bench_core::testing::RecordingConnection;
    use bench_core::{Column, SemanticType, Value};
    use chrono::NaiveDate;

    fn dataset() -> Dataset {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        Dataset::new(
            vec![
                Column::new("id", SemanticType::Int64),
                Column::new("name", SemanticType::String),
                Column::new("ts", SemanticType::DateTime),
            ],
            (0..3)
                .map(|i| vec![Value::Int(i), Value::Text(format!("n{i}")), Value::DateTime(ts)])
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_container_spec_from_options() {
        let handler = ClickHouseHandler::new(ClickHouseOptions::default());
        let spec = handler.container().spec();
        assert_eq!(spec.image_ref(), "clickhouse/clickhouse-server:latest");
        assert_eq!(spec.host_port(8123), Some(8123));
        assert_eq!(spec.host_port(9000), Some(9000));
        assert_eq!(spec.env["CLICKHOUSE_DEFAULT_ACCESS_MANAGEMENT"], "1");
        assert_eq!(spec.cpu_quota(), 200_000);
        assert_eq!(spec.memory_limit, "4g");
    }

    #[tokio::test]
    async fn test_load_creates_table_then_appends() {
        let handler = ClickHouseHandler::new(ClickHouseOptions::default());
        let mut conn = RecordingConnection::new();
        let log = conn.log();

        let rows = handler.load_dataset(&mut conn, &dataset(), "data").await.unwrap();

        assert_eq!(rows, 3);
        assert_eq!(
            log.statements(),
            vec![
                "EXECUTE CREATE TABLE IF NOT EXISTS data (id Int64, name String, ts DateTime) ENGINE = MergeTree ORDER BY id",
                "LOAD data APPEND 3",
                "COUNT SELECT COUNT(*) FROM data",
            ]
        );
    }

    #[tokio::test]
    async fn test_ddl_failure_is_dataset_load_error() {
        let handler = ClickHouseHandler::new(ClickHouseOptions::default());
        let create = ClickHouseDdl
            .create_table("data", dataset().columns())
            .unwrap();
        let mut conn = RecordingConnection::new().with_failing_statement(create);
        let log = conn.log();

        let err = handler.load_dataset(&mut conn, &dataset(), "data").await.unwrap_err();

        assert!(matches!(err, HandlerError::DatasetLoad(DatasetLoadError::Ddl { .. })));
        assert_eq!(log.statements().len(), 1);
    }

    #[tokio::test]
    async fn test_boolean_column_is_unsupported() {
        let handler = ClickHouseHandler::new(ClickHouseOptions::default());
        let dataset = Dataset::new(
            vec![Column::new("flag", SemanticType::Boolean)],
            vec![vec![Value::Bool(true)]],
        )
        .unwrap();
        let mut conn = RecordingConnection::new();
        let log = conn.log();

        let err = handler.load_dataset(&mut conn, &dataset, "data").await.unwrap_err();

        assert!(matches!(err, HandlerError::UnsupportedType(_)));
        assert!(log.statements().is_empty());
    }

    #[tokio::test]
    async fn test_count_mismatch_is_dataset_load_error() {
        let handler = ClickHouseHandler::new(ClickHouseOptions::default());
        let mut conn = RecordingConnection::new().with_count_override(2);

        let err = handler.load_dataset(&mut conn, &dataset(), "data").await.unwrap_err();

        assert!(matches!(
            err,
            HandlerError::DatasetLoad(DatasetLoadError::RowCountMismatch {
                expected: 3,
                found: 2,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_probe_false_without_container() {
        let runtime = FakeRuntime::new();
        let handler = ClickHouseHandler::new(ClickHouseOptions::default());
        assert!(!handler.is_ready(&runtime).await);
    }
}
