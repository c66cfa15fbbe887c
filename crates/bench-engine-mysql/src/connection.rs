//! MySQL connection: query execution and batched loading.

use crate::ddl::MySqlDdl;
use crate::error::MySqlError;
use async_trait::async_trait;
use bench_core::connection::SAMPLE_ROWS;
use bench_core::{Dataset, HandlerError, LoadMode, QueryResult, SqlConnection, ToDdl, Value};
use chrono::{Datelike, Timelike};
use mysql_async::{prelude::*, Conn, Params, Pool, Row};
use tracing::debug;

/// Placeholder limit of the MySQL binary protocol.
const MAX_PLACEHOLDERS: usize = 65_535;

pub struct MySqlConnection {
    pool: Pool,
    conn: Conn,
    batch_size: usize,
}

impl MySqlConnection {
    pub async fn connect(url: &str, batch_size: usize) -> Result<Self, MySqlError> {
        let pool = Pool::from_url(url)?;
        let conn = pool.get_conn().await?;
        Ok(Self {
            pool,
            conn,
            batch_size: batch_size.max(1),
        })
    }

    async fn run_query(&mut self, statement: &str) -> Result<QueryResult, MySqlError> {
        let rows: Vec<Row> = self.conn.query(statement).await?;
        let mut result = QueryResult {
            rows: rows.len() as u64,
            ..QueryResult::empty()
        };
        for (index, row) in rows.iter().enumerate() {
            let values = (0..row.len()).filter_map(|i| row.as_ref(i));
            if index < SAMPLE_ROWS {
                result.sample.push(values.clone().map(render).collect());
            }
            result.size_bytes += values.map(value_size).sum::<u64>();
        }
        Ok(result)
    }

    async fn insert_rows(
        &mut self,
        table: &str,
        columns: &[&str],
        rows: &[Vec<Value>],
    ) -> Result<u64, MySqlError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = MySqlDdl.to_insert(table, columns, rows.len());
        let params: Vec<mysql_async::Value> = rows.iter().flatten().map(to_mysql).collect();
        self.conn.exec_drop(&sql, Params::Positional(params)).await?;
        Ok(rows.len() as u64)
    }

    async fn load(
        &mut self,
        table: &str,
        dataset: &Dataset,
        mode: LoadMode,
    ) -> Result<u64, MySqlError> {
        if mode == LoadMode::Replace {
            let drop = MySqlDdl.drop_table(table);
            self.conn.query_drop(drop.as_str()).await?;
            let create = MySqlDdl.create_table(table, dataset.columns())?;
            self.conn.query_drop(create.as_str()).await?;
        }

        let columns = dataset.column_names();
        let rows_per_batch = rows_per_batch(self.batch_size, columns.len());
        let mut inserted = 0;
        for batch in dataset.rows().chunks(rows_per_batch) {
            inserted += self.insert_rows(table, &columns, batch).await?;
            debug!("Inserted {}/{} rows into {}", inserted, dataset.row_count(), table);
        }
        Ok(inserted)
    }
}

/// Rows per `INSERT`, capped so the statement stays under the placeholder limit.
pub(crate) fn rows_per_batch(batch_size: usize, column_count: usize) -> usize {
    let by_placeholders = MAX_PLACEHOLDERS / column_count.max(1);
    batch_size.min(by_placeholders).max(1)
}

pub(crate) fn to_mysql(value: &Value) -> mysql_async::Value {
    use mysql_async::Value as My;
    match value {
        Value::Null => My::NULL,
        Value::Int(v) => My::Int(*v),
        Value::UInt(v) => My::UInt(*v),
        Value::Float(v) => My::Double(*v),
        Value::Text(v) => My::Bytes(v.as_bytes().to_vec()),
        Value::Bool(v) => My::Int(i64::from(*v)),
        Value::Date(d) => My::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        Value::DateTime(dt) => My::Date(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            dt.nanosecond() / 1_000,
        ),
    }
}

fn value_size(value: &mysql_async::Value) -> u64 {
    use mysql_async::Value as My;
    match value {
        My::NULL => 0,
        My::Bytes(bytes) => bytes.len() as u64,
        My::Float(_) => 4,
        My::Int(_) | My::UInt(_) | My::Double(_) | My::Date(..) | My::Time(..) => 8,
    }
}

fn render(value: &mysql_async::Value) -> String {
    use mysql_async::Value as My;
    match value {
        My::NULL => "NULL".to_string(),
        My::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        other => other.as_sql(true),
    }
}

#[async_trait]
impl SqlConnection for MySqlConnection {
    async fn execute(&mut self, statement: &str) -> Result<(), HandlerError> {
        self.conn
            .query_drop(statement)
            .await
            .map_err(MySqlError::from)?;
        Ok(())
    }

    async fn query(&mut self, statement: &str) -> Result<QueryResult, HandlerError> {
        Ok(self.run_query(statement).await?)
    }

    async fn query_count(&mut self, statement: &str) -> Result<u64, HandlerError> {
        let count: Option<u64> = self
            .conn
            .query_first(statement)
            .await
            .map_err(MySqlError::from)?;
        Ok(count.unwrap_or(0))
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
        let MySqlConnection { pool, conn, .. } = *self;
        drop(conn);
        pool.disconnect().await.map_err(MySqlError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_rows_per_batch_respects_placeholder_limit() {
        assert_eq!(rows_per_batch(1000, 5), 1000);
        assert_eq!(rows_per_batch(100_000, 10), 6553);
        assert_eq!(rows_per_batch(0, 3), 1);
    }

    #[test]
    fn test_value_conversion() {
        use mysql_async::Value as My;

        let ts = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_micro_opt(23, 59, 58, 123_456)
            .unwrap();
        assert_eq!(
            to_mysql(&Value::DateTime(ts)),
            My::Date(2024, 2, 29, 23, 59, 58, 123_456)
        );
        assert_eq!(to_mysql(&Value::Bool(true)), My::Int(1));
        assert_eq!(to_mysql(&Value::Text("a".into())), My::Bytes(b"a".to_vec()));
        assert_eq!(to_mysql(&Value::Null), My::NULL);
    }

    #[test]
    fn test_result_value_size_and_render() {
        use mysql_async::Value as My;

        assert_eq!(value_size(&My::Bytes(b"hello".to_vec())), 5);
        assert_eq!(value_size(&My::NULL), 0);
        assert_eq!(value_size(&My::Int(7)), 8);
        assert_eq!(render(&My::Bytes(b"hello".to_vec())), "hello");
        assert_eq!(render(&My::Int(7)), "7");
    }
}
