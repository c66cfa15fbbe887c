//! ClickHouse connection over HTTP.

use crate::client::ClickHouseClient;
use crate::ddl::ClickHouseDdl;
use crate::error::ClickHouseError;
use async_trait::async_trait;
use bench_core::connection::SAMPLE_ROWS;
use bench_core::{
    Column, Dataset, HandlerError, LoadMode, QueryResult, SqlConnection, ToDdl, Value,
};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

/// Body of a `JSONCompact` response.
#[derive(Debug, Deserialize)]
struct CompactResponse {
    #[serde(default)]
    data: Vec<Vec<JsonValue>>,
    rows: Option<u64>,
}

pub struct ClickHouseConnection {
    client: ClickHouseClient,
    batch_size: usize,
}

impl ClickHouseConnection {
    pub fn new(client: ClickHouseClient, batch_size: usize) -> Self {
        Self {
            client,
            batch_size: batch_size.max(1),
        }
    }

    async fn load(
        &self,
        table: &str,
        dataset: &Dataset,
        mode: LoadMode,
    ) -> Result<u64, ClickHouseError> {
        if mode == LoadMode::Replace {
            self.client.query(&ClickHouseDdl.drop_table(table)).await?;
            let create = ClickHouseDdl.create_table(table, dataset.columns())?;
            self.client.query(&create).await?;
        }

        let insert = ClickHouseDdl.insert_statement(table);
        let mut inserted = 0u64;
        for batch in dataset.rows().chunks(self.batch_size) {
            let body = to_json_each_row(dataset.columns(), batch)?;
            self.client.insert(&insert, body).await?;
            inserted += batch.len() as u64;
            debug!("Inserted {}/{} rows into {}", inserted, dataset.row_count(), table);
        }
        Ok(inserted)
    }
}

/// Parse a query response into a [`QueryResult`].
///
/// Falls back to counting lines when the statement chose its own output format.
pub(crate) fn parse_result(body: &str) -> QueryResult {
    if body.trim().is_empty() {
        return QueryResult::empty();
    }
    match serde_json::from_str::<CompactResponse>(body) {
        Ok(response) => {
            let sample = response
                .data
                .iter()
                .take(SAMPLE_ROWS)
                .map(|row| row.iter().map(render).collect())
                .collect();
            let size_bytes = response
                .data
                .iter()
                .flatten()
                .map(|v| render(v).len() as u64)
                .sum();
            QueryResult {
                rows: response.rows.unwrap_or(response.data.len() as u64),
                size_bytes,
                sample,
            }
        }
        Err(_) => {
            let lines: Vec<&str> = body.lines().filter(|l| !l.is_empty()).collect();
            QueryResult {
                rows: lines.len() as u64,
                size_bytes: body.len() as u64,
                sample: lines
                    .iter()
                    .take(SAMPLE_ROWS)
                    .map(|l| vec![l.to_string()])
                    .collect(),
            }
        }
    }
}

/// First cell of a `COUNT(*)` response; 64-bit integers arrive quoted by default.
pub(crate) fn parse_count(body: &str) -> Result<u64, ClickHouseError> {
    let response: CompactResponse = serde_json::from_str(body)?;
    let cell = response
        .data
        .first()
        .and_then(|row| row.first())
        .ok_or_else(|| ClickHouseError::MalformedResponse("empty COUNT(*) result".to_string()))?;
    match cell {
        JsonValue::Number(n) => n.as_u64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ClickHouseError::MalformedResponse(format!("not a count: {cell}")))
}

fn render(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Int(v) => JsonValue::from(*v),
        Value::UInt(v) => JsonValue::from(*v),
        Value::Float(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Text(v) => JsonValue::String(v.clone()),
        Value::Date(v) => JsonValue::String(v.format("%Y-%m-%d").to_string()),
        Value::DateTime(v) => JsonValue::String(v.format("%Y-%m-%d %H:%M:%S").to_string()),
        Value::Bool(v) => JsonValue::Bool(*v),
    }
}

/// One JSON object per line, keyed by column name.
pub(crate) fn to_json_each_row(
    columns: &[Column],
    rows: &[Vec<Value>],
) -> Result<String, ClickHouseError> {
    let mut body = String::new();
    for row in rows {
        let object: Map<String, JsonValue> = columns
            .iter()
            .zip(row)
            .map(|(column, value)| (column.name.clone(), to_json(value)))
            .collect();
        body.push_str(&serde_json::to_string(&object)?);
        body.push('\n');
    }
    Ok(body)
}

#[async_trait]
impl SqlConnection for ClickHouseConnection {
    async fn execute(&mut self, statement: &str) -> Result<(), HandlerError> {
        self.client.query(statement).await?;
        Ok(())
    }

    async fn query(&mut self, statement: &str) -> Result<QueryResult, HandlerError> {
        let body = self.client.query(statement).await?;
        Ok(parse_result(&body))
    }

    async fn query_count(&mut self, statement: &str) -> Result<u64, HandlerError> {
        let body = self.client.query(statement).await?;
        Ok(parse_count(&body)?)
    }

    async fn bulk_load(
        &mut self,
        table: &str,
        dataset: &Dataset,
        mode: LoadMode,
    ) -> Result<u64, HandlerError> {
        Ok(self.load(table, dataset, mode).await?)
    }
}
