//! Error types for datasets and handlers.

use crate::dataset::SemanticType;
use crate::handler::Engine;
use bench_container::RuntimeError;
use std::time::Duration;
use thiserror::Error;

/// A column type with no mapping in the target engine (or no semantic type at all).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported column type '{type_name}' for {target}")]
pub struct UnsupportedTypeError {
    pub type_name: String,
    pub target: String,
}

impl UnsupportedTypeError {
    pub fn new(type_name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            target: target.into(),
        }
    }
}

/// Invalid dataset layout.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Dataset has no columns")]
    NoColumns,

    #[error("Duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("Row {row} has {found} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Row {row}, column '{column}': value does not fit type {expected}")]
    TypeMismatch {
        row: usize,
        column: String,
        expected: SemanticType,
    },
}

/// The dataset could not be loaded and verified.
#[derive(Error, Debug)]
pub enum DatasetLoadError {
    #[error("Row count mismatch in '{table}': expected {expected}, found {found}")]
    RowCountMismatch {
        table: String,
        expected: u64,
        found: u64,
    },

    #[error("Failed to create table '{table}': {message}")]
    Ddl { table: String, message: String },

    #[error("Failed to load rows into '{table}': {message}")]
    Load { table: String, message: String },
}

/// Errors raised by a [`DatabaseHandler`](crate::DatabaseHandler) or its connection.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    DatasetLoad(#[from] DatasetLoadError),

    #[error(transparent)]
    UnsupportedType(#[from] UnsupportedTypeError),

    #[error("Query failed: {0}")]
    QueryExecution(String),

    #[error("Query timed out after {0:?}")]
    QueryTimeout(Duration),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("{engine} error: {message}")]
    Engine { engine: Engine, message: String },

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl HandlerError {
    pub fn engine(engine: Engine, message: impl Into<String>) -> Self {
        HandlerError::Engine {
            engine,
            message: message.into(),
        }
    }

    /// Short name of the error kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerError::DatasetLoad(_) => "DatasetLoadError",
            HandlerError::UnsupportedType(_) => "UnsupportedTypeError",
            HandlerError::QueryExecution(_)
            | HandlerError::QueryTimeout(_)
            | HandlerError::Engine { .. } => "QueryExecutionError",
            HandlerError::Connection(_) => "ConnectionError",
            HandlerError::Runtime(_) => "RuntimeError",
        }
    }

    /// Reclassify a failure during loading as a [`DatasetLoadError`].
    ///
    /// Unsupported types keep their own kind.
    pub fn into_load_error(self, table: &str) -> HandlerError {
        match self {
            HandlerError::DatasetLoad(_) | HandlerError::UnsupportedType(_) => self,
            other => DatasetLoadError::Load {
                table: table.to_string(),
                message: other.to_string(),
            }
            .into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_load_error_wraps_driver_failures() {
        let err = HandlerError::engine(Engine::MySql, "Table 'testdb.data' doesn't exist");
        let wrapped = err.into_load_error("data");
        assert_eq!(wrapped.kind(), "DatasetLoadError");
        assert!(wrapped.to_string().contains("Table 'testdb.data'"));
    }

    #[test]
    fn test_into_load_error_keeps_unsupported_type() {
        let err: HandlerError = UnsupportedTypeError::new("bool", "ClickHouse").into();
        assert_eq!(err.into_load_error("data").kind(), "UnsupportedTypeError");
    }
}
