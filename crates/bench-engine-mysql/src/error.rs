//! Error types for the MySQL engine.

use bench_core::{Engine, HandlerError, UnsupportedTypeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MySqlError {
    #[error("MySQL error: {0}")]
    MySQL(#[from] mysql_async::Error),

    #[error(transparent)]
    UnsupportedType(#[from] UnsupportedTypeError),
}

impl From<MySqlError> for HandlerError {
    fn from(err: MySqlError) -> Self {
        match err {
            MySqlError::UnsupportedType(e) => HandlerError::UnsupportedType(e),
            MySqlError::MySQL(e) => HandlerError::engine(Engine::MySql, e.to_string()),
        }
    }
}
