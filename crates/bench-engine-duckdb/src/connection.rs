//! DuckDB connection: one long-lived driver session inside the container.

use crate::ddl::DuckDbDdl;
use crate::driver::{CountOutput, QueryOutput, Request, NULL_MARKER};
use crate::error::DuckDbError;
use async_trait::async_trait;
use bench_container::ExecSession;
use bench_core::connection::SAMPLE_ROWS;
use bench_core::{Dataset, HandlerError, LoadMode, QueryResult, SqlConnection, ToDdl, Value};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize)]
#[serde(untagged)]
enum Reply<T> {
    Failed { error: String },
    Done(T),
}

pub struct DuckDbConnection {
    session: Box<dyn ExecSession>,
    chunk_rows: usize,
}

impl DuckDbConnection {
    pub fn new(session: Box<dyn ExecSession>, chunk_rows: usize) -> Self {
        Self {
            session,
            chunk_rows: chunk_rows.max(1),
        }
    }

    async fn send<T: DeserializeOwned>(&mut self, request: &Request<'_>) -> Result<T, DuckDbError> {
        let line = serde_json::to_string(request)?;
        let reply = self.session.request(&line).await?;
        match serde_json::from_str(reply.trim())? {
            Reply::Failed { error } => Err(DuckDbError::Driver(error)),
            Reply::Done(output) => Ok(output),
        }
    }

    async fn load(
        &mut self,
        table: &str,
        dataset: &Dataset,
        mode: LoadMode,
    ) -> Result<u64, DuckDbError> {
        let quoted = DuckDbDdl.quote(table);
        let mut prelude = Vec::new();
        if mode == LoadMode::Replace {
            prelude.push(DuckDbDdl.drop_table(table));
            prelude.push(DuckDbDdl.create_table(table, dataset.columns())?);
        }

        if dataset.is_empty() {
            for statement in &prelude {
                self.send::<IgnoredAny>(&Request::Exec { sql: statement }).await?;
            }
            return Ok(0);
        }

        let mut inserted = 0u64;
        let chunk_rows = self.chunk_rows;
        for chunk in dataset.rows().chunks(chunk_rows) {
            let csv = to_csv(chunk)?;
            let request = Request::Copy {
                table: &quoted,
                prelude: std::mem::take(&mut prelude),
                csv: &csv,
            };
            self.send::<CountOutput>(&request).await?;
            inserted += chunk.len() as u64;
            debug!("Copied {}/{} rows into {}", inserted, dataset.row_count(), table);
        }
        Ok(inserted)
    }
}

/// Headerless CSV with [`NULL_MARKER`] for NULL cells.
pub(crate) fn to_csv(rows: &[Vec<Value>]) -> Result<String, DuckDbError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row.iter().map(|value| match value {
            Value::Null => NULL_MARKER.to_string(),
            other => other.to_string(),
        }))?;
    }
    let bytes = writer.into_inner().map_err(|e| DuckDbError::Io(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| DuckDbError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

#[async_trait]
impl SqlConnection for DuckDbConnection {
    async fn execute(&mut self, statement: &str) -> Result<(), HandlerError> {
        self.send::<IgnoredAny>(&Request::Exec { sql: statement })
            .await?;
        Ok(())
    }

    async fn query(&mut self, statement: &str) -> Result<QueryResult, HandlerError> {
        let output: QueryOutput = self
            .send(&Request::Query {
                sql: statement,
                sample: SAMPLE_ROWS,
            })
            .await?;
        Ok(QueryResult {
            rows: output.rows,
            size_bytes: output.size_bytes,
            sample: output.sample,
        })
    }

    async fn query_count(&mut self, statement: &str) -> Result<u64, HandlerError> {
        let output: CountOutput = self.send(&Request::Count { sql: statement }).await?;
        Ok(output.count)
    }

    async fn bulk_load(
        &mut self,
        table: &str,
        dataset: &Dataset,
        mode: LoadMode,
    ) -> Result<u64, HandlerError> {
        Ok(self.load(table, dataset, mode).await?)
    }

    async fn close(self: Box<Self>) -> Result<(), HandlerError> {
        self.session.close().await.map_err(DuckDbError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_container::testing::FakeRuntime;
    use bench_container::{ContainerRuntime, ContainerSpec};
    use bench_core::{Column, SemanticType};
    use std::sync::Arc;

    async fn connection(runtime: &Arc<FakeRuntime>, chunk_rows: usize) -> DuckDbConnection {
        let handle = runtime.insert_running(ContainerSpec::new("python", "3.11-slim", "duckdb"));
        let session = runtime
            .open_session(&handle, &["python".to_string()])
            .await
            .unwrap();
        DuckDbConnection::new(session, chunk_rows)
    }

    fn request(line: &str) -> serde_json::Value {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn test_to_csv_marks_nulls_and_quotes_text() {
        let rows = vec![
            vec![Value::Int(1), Value::Text("a,b".into())],
            vec![Value::Null, Value::Text("c".into())],
        ];
        assert_eq!(to_csv(&rows).unwrap(), "1,\"a,b\"\n\\N,c\n");
    }

    #[tokio::test]
    async fn test_statements_share_one_session() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.on_session(|_, line| {
            let req = request(line);
            Ok(match req["op"].as_str().unwrap() {
                "query" => r#"{"rows": 2, "size_bytes": 4, "sample": [["1"], ["2"]]}"#,
                "count" => r#"{"count": 7}"#,
                _ => r#"{"ok": true}"#,
            }
            .to_string())
        });
        let mut conn = connection(&runtime, 10).await;

        conn.execute("CREATE TABLE t (x INTEGER)").await.unwrap();
        let result = conn.query("SELECT x\nFROM t").await.unwrap();
        let count = conn.query_count("SELECT COUNT(*) FROM t").await.unwrap();
        Box::new(conn).close().await.unwrap();

        assert_eq!(result.rows, 2);
        assert_eq!(result.size_bytes, 4);
        assert_eq!(result.sample.len(), 2);
        assert_eq!(count, 7);
        assert_eq!(runtime.opened_sessions().len(), 1);
        assert_eq!(runtime.closed_sessions(), 1);

        let requests = runtime.session_requests();
        assert_eq!(requests.len(), 3);
        let query = request(&requests[1].1);
        assert_eq!(query["op"], "query");
        assert_eq!(query["sql"], "SELECT x\nFROM t");
        assert_eq!(query["sample"], 5);
    }

    #[tokio::test]
    async fn test_driver_error_reply_is_query_error_and_session_survives() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.on_session(|_, line| {
            if line.contains("nope") {
                Ok(r#"{"error": "CatalogException: Table with name nope does not exist!"}"#.to_string())
            } else {
                Ok(r#"{"rows": 1, "size_bytes": 1, "sample": [["1"]]}"#.to_string())
            }
        });
        let mut conn = connection(&runtime, 10).await;

        let err = conn.query("SELECT * FROM nope").await.unwrap_err();
        assert_eq!(err.kind(), "QueryExecutionError");
        assert!(err.to_string().contains("CatalogException"));

        let result = conn.query("SELECT 1").await.unwrap();
        assert_eq!(result.rows, 1);
    }

    #[tokio::test]
    async fn test_dead_session_reports_driver_stderr() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.on_session(|_, _| Err("ModuleNotFoundError: No module named 'duckdb'".to_string()));
        let mut conn = connection(&runtime, 10).await;

        let err = conn.execute("SELECT 1").await.unwrap_err();
        assert!(err.to_string().contains("ModuleNotFoundError"));
    }

    #[tokio::test]
    async fn test_replace_load_sends_prelude_once_and_chunks_rows() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.on_session(|_, _| Ok(r#"{"count": 0}"#.to_string()));
        let dataset = Dataset::new(
            vec![Column::new("id", SemanticType::Int64)],
            (0..5).map(|i| vec![Value::Int(i)]).collect(),
        )
        .unwrap();
        let mut conn = connection(&runtime, 2).await;

        let rows = conn.bulk_load("data", &dataset, LoadMode::Replace).await.unwrap();

        assert_eq!(rows, 5);
        let requests: Vec<_> = runtime
            .session_requests()
            .iter()
            .map(|(_, line)| request(line))
            .collect();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0]["op"], "copy");
        assert_eq!(requests[0]["table"], "\"data\"");
        assert_eq!(
            requests[0]["prelude"],
            serde_json::json!([
                "DROP TABLE IF EXISTS \"data\"",
                "CREATE TABLE \"data\" (\"id\" BIGINT)"
            ])
        );
        assert_eq!(requests[0]["csv"], "0\n1\n");
        assert_eq!(requests[1]["prelude"], serde_json::json!([]));
        assert_eq!(requests[2]["csv"], "4\n");
    }

    #[tokio::test]
    async fn test_empty_replace_load_only_recreates_table() {
        let runtime = Arc::new(FakeRuntime::new());
        let dataset = Dataset::new(vec![Column::new("id", SemanticType::Int64)], vec![]).unwrap();
        let mut conn = connection(&runtime, 2).await;

        let rows = conn.bulk_load("data", &dataset, LoadMode::Replace).await.unwrap();

        assert_eq!(rows, 0);
        let ops: Vec<_> = runtime
            .session_requests()
            .iter()
            .map(|(_, line)| request(line)["op"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ops, vec!["exec", "exec"]);
    }
}
