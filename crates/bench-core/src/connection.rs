//! SQL execution layer: the connection contract every engine implements.

use crate::dataset::Dataset;
use crate::error::{DatasetLoadError, HandlerError};
use async_trait::async_trait;
use tracing::info;

/// Number of result rows kept for logging.
pub const SAMPLE_ROWS: usize = 5;

/// Outcome of a query: row count and approximate in-memory size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub rows: u64,
    pub size_bytes: u64,
    /// First rows rendered as text, at most [`SAMPLE_ROWS`].
    pub sample: Vec<Vec<String>>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// How `bulk_load` treats existing table contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Drop and recreate the table from the dataset's columns.
    Replace,
    /// Insert into an existing table.
    Append,
}

/// An open connection to one engine.
#[async_trait]
pub trait SqlConnection: Send {
    /// Run a statement that returns no result (DDL/DML).
    async fn execute(&mut self, statement: &str) -> Result<(), HandlerError>;

    /// Run a query and measure its result set.
    async fn query(&mut self, statement: &str) -> Result<QueryResult, HandlerError>;

    /// Run a query whose first column of the first row is a count.
    async fn query_count(&mut self, statement: &str) -> Result<u64, HandlerError>;

    /// Load every dataset row into `table`; returns the number of rows written.
    async fn bulk_load(
        &mut self,
        table: &str,
        dataset: &Dataset,
        mode: LoadMode,
    ) -> Result<u64, HandlerError>;

    async fn close(self: Box<Self>) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Check `SELECT COUNT(*)` on `table` against the expected row count.
pub async fn verify_row_count(
    conn: &mut dyn SqlConnection,
    table: &str,
    expected: u64,
) -> Result<u64, HandlerError> {
    let found = conn
        .query_count(&format!("SELECT COUNT(*) FROM {table}"))
        .await
        .map_err(|e| e.into_load_error(table))?;
    if found != expected {
        return Err(DatasetLoadError::RowCountMismatch {
            table: table.to_string(),
            expected,
            found,
        }
        .into());
    }
    info!("Verified {} rows in '{}'", found, table);
    Ok(found)
}
