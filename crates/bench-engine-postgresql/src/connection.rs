//! PostgreSQL connection: query execution and batched loading.

use crate::ddl::PostgresDdl;
use crate::error::PostgresError;
use async_trait::async_trait;
use bench_core::connection::SAMPLE_ROWS;
use bench_core::{
    Column, Dataset, HandlerError, LoadMode, QueryResult, SemanticType, SqlConnection, ToDdl,
    Value,
};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::{debug, error};

/// Bind parameter limit of the PostgreSQL wire protocol.
const MAX_PARAMETERS: usize = 65_535;

type Param = Box<dyn ToSql + Sync + Send>;

pub struct PostgresConnection {
    client: Client,
    connection_task: JoinHandle<()>,
    batch_size: usize,
}

impl PostgresConnection {
    pub async fn connect(url: &str, batch_size: usize) -> Result<Self, PostgresError> {
        let (client, connection) = tokio_postgres::connect(url, NoTls).await?;

        // Spawn the connection task
        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        client.simple_query("SELECT 1").await?;

        Ok(Self {
            client,
            connection_task,
            batch_size: batch_size.max(1),
        })
    }

    async fn run_query(&self, statement: &str) -> Result<QueryResult, PostgresError> {
        let messages = self.client.simple_query(statement).await?;
        let mut result = QueryResult::empty();
        for message in &messages {
            if let SimpleQueryMessage::Row(row) = message {
                let values: Vec<Option<&str>> = (0..row.len()).map(|i| row.get(i)).collect();
                if result.sample.len() < SAMPLE_ROWS {
                    result.sample.push(
                        values
                            .iter()
                            .map(|v| v.unwrap_or("NULL").to_string())
                            .collect(),
                    );
                }
                result.size_bytes += values.iter().flatten().map(|v| v.len() as u64).sum::<u64>();
                result.rows += 1;
            }
        }
        Ok(result)
    }

    async fn insert_rows(
        &self,
        table: &str,
        columns: &[Column],
        rows: &[Vec<Value>],
    ) -> Result<u64, PostgresError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        let sql = PostgresDdl.to_insert(table, &names, rows.len());

        let mut params: Vec<Param> = Vec::with_capacity(rows.len() * columns.len());
        for row in rows {
            for (column, value) in columns.iter().zip(row) {
                params.push(to_param(column, value)?);
            }
        }
        let param_refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        self.client.execute(&sql, &param_refs).await?;
        Ok(rows.len() as u64)
    }

    async fn load(
        &self,
        table: &str,
        dataset: &Dataset,
        mode: LoadMode,
    ) -> Result<u64, PostgresError> {
        if mode == LoadMode::Replace {
            let create = PostgresDdl.create_table(table, dataset.columns())?;
            let ddl = format!("{}; {}", PostgresDdl.drop_table(table), create);
            self.client.batch_execute(&ddl).await?;
        }

        let rows_per_batch = rows_per_batch(self.batch_size, dataset.columns().len());
        let mut inserted = 0;
        for batch in dataset.rows().chunks(rows_per_batch) {
            inserted += self.insert_rows(table, dataset.columns(), batch).await?;
            debug!("Inserted {}/{} rows into {}", inserted, dataset.row_count(), table);
        }
        Ok(inserted)
    }
}

/// Rows per `INSERT`, capped so the statement stays under the parameter limit.
pub(crate) fn rows_per_batch(batch_size: usize, column_count: usize) -> usize {
    let by_parameters = MAX_PARAMETERS / column_count.max(1);
    batch_size.min(by_parameters).max(1)
}

fn out_of_range(column: &Column, value: impl ToString) -> PostgresError {
    PostgresError::OutOfRange {
        column: column.name.clone(),
        value: value.to_string(),
        semantic_type: column.semantic_type,
    }
}

/// Bind a value with the Rust type matching the column's DDL type.
pub(crate) fn to_param(column: &Column, value: &Value) -> Result<Param, PostgresError> {
    use SemanticType as T;

    let param: Param = match (column.semantic_type, value) {
        (T::Int8 | T::Int16, Value::Int(v)) => {
            Box::new(i16::try_from(*v).map_err(|_| out_of_range(column, v))?)
        }
        (T::Int32, Value::Int(v)) => {
            Box::new(i32::try_from(*v).map_err(|_| out_of_range(column, v))?)
        }
        (T::Int64, Value::Int(v)) => Box::new(*v),
        (T::UInt8, Value::UInt(v)) => {
            Box::new(i16::try_from(*v).map_err(|_| out_of_range(column, v))?)
        }
        (T::UInt16, Value::UInt(v)) => {
            Box::new(i32::try_from(*v).map_err(|_| out_of_range(column, v))?)
        }
        (T::UInt32, Value::UInt(v)) => {
            Box::new(i64::try_from(*v).map_err(|_| out_of_range(column, v))?)
        }
        (T::UInt64, Value::UInt(v)) => Box::new(Decimal::from(*v)),
        (T::Float32, Value::Float(v)) => Box::new(*v as f32),
        (T::Float64, Value::Float(v)) => Box::new(*v),
        (T::String, Value::Text(v)) => Box::new(v.clone()),
        (T::Date, Value::Date(v)) => Box::new(*v),
        (T::DateTime, Value::DateTime(v)) => Box::new(*v),
        (T::Boolean, Value::Bool(v)) => Box::new(*v),
        (semantic_type, Value::Null) => typed_null(semantic_type),
        (_, other) => return Err(out_of_range(column, other)),
    };
    Ok(param)
}

fn typed_null(semantic_type: SemanticType) -> Param {
    use SemanticType as T;

    match semantic_type {
        T::Int8 | T::Int16 | T::UInt8 => Box::new(None::<i16>),
        T::Int32 | T::UInt16 => Box::new(None::<i32>),
        T::Int64 | T::UInt32 => Box::new(None::<i64>),
        T::UInt64 => Box::new(None::<Decimal>),
        T::Float32 => Box::new(None::<f32>),
        T::Float64 => Box::new(None::<f64>),
        T::String => Box::new(None::<String>),
        T::Date => Box::new(None::<NaiveDate>),
        T::DateTime => Box::new(None::<NaiveDateTime>),
        T::Boolean => Box::new(None::<bool>),
    }
}

#[async_trait]
impl SqlConnection for PostgresConnection {
    async fn execute(&mut self, statement: &str) -> Result<(), HandlerError> {
        self.client
            .batch_execute(statement)
            .await
            .map_err(PostgresError::from)?;
        Ok(())
    }

    async fn query(&mut self, statement: &str) -> Result<QueryResult, HandlerError> {
        Ok(self.run_query(statement).await?)
    }

    async fn query_count(&mut self, statement: &str) -> Result<u64, HandlerError> {
        let row = self
            .client
            .query_one(statement, &[])
            .await
            .map_err(PostgresError::from)?;
        let count: i64 = row.try_get(0).map_err(PostgresError::from)?;
        Ok(count.max(0) as u64)
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
        let PostgresConnection {
            client,
            connection_task,
            ..
        } = *self;
        drop(client);
        if let Err(e) = connection_task.await {
            debug!("PostgreSQL connection task ended abnormally: {}", e);
        }
        Ok(())
    }
}
