//! Error types for the ClickHouse engine.

use bench_core::{Engine, HandlerError, UnsupportedTypeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClickHouseError {
    #[error("ClickHouse HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ClickHouse returned status {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Failed to decode ClickHouse response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unexpected ClickHouse response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    UnsupportedType(#[from] UnsupportedTypeError),
}

impl From<ClickHouseError> for HandlerError {
    fn from(err: ClickHouseError) -> Self {
        match err {
            ClickHouseError::UnsupportedType(e) => HandlerError::UnsupportedType(e),
            other => HandlerError::engine(Engine::ClickHouse, other.to_string()),
        }
    }
}
