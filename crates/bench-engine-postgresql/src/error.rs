//! Error types for the PostgreSQL engine.

use bench_core::{Engine, HandlerError, SemanticType, UnsupportedTypeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostgresError {
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Value {value} out of range for column '{column}' ({semantic_type})")]
    OutOfRange {
        column: String,
        value: String,
        semantic_type: SemanticType,
    },

    #[error(transparent)]
    UnsupportedType(#[from] UnsupportedTypeError),
}

impl From<PostgresError> for HandlerError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::UnsupportedType(e) => HandlerError::UnsupportedType(e),
            other => HandlerError::engine(Engine::PostgreSql, other.to_string()),
        }
    }
}
