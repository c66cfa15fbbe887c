//! Error types for the DuckDB engine.

use bench_container::RuntimeError;
use bench_core::{Engine, HandlerError, UnsupportedTypeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DuckDbError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("DuckDB driver error: {0}")]
    Driver(String),

    #[error("Failed to decode DuckDB driver output: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("In-memory database ':memory:' cannot be shared between the readiness check and the driver session")]
    InMemoryDatabase,

    #[error("Container {0} has not been started")]
    NotStarted(String),

    #[error(transparent)]
    UnsupportedType(#[from] UnsupportedTypeError),
}

impl From<DuckDbError> for HandlerError {
    fn from(err: DuckDbError) -> Self {
        match err {
            DuckDbError::UnsupportedType(e) => HandlerError::UnsupportedType(e),
            DuckDbError::Runtime(e) => HandlerError::Runtime(e),
            DuckDbError::NotStarted(name) => {
                HandlerError::Connection(format!("container {name} has not been started"))
            }
            other => HandlerError::engine(Engine::DuckDb, other.to_string()),
        }
    }
}
