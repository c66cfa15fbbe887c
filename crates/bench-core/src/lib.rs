//! Core model shared by every db-bench crate.
//!
//! - [`Dataset`]: the column-typed table loaded into every engine
//! - [`QueryMetrics`] and [`BenchmarkRun`]: what a benchmark produces
//! - [`DatabaseHandler`] and [`SqlConnection`]: the capability interface each engine implements

pub mod connection;
pub mod dataset;
pub mod ddl;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod query;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use connection::{verify_row_count, LoadMode, QueryResult, SqlConnection};
pub use dataset::{Column, Dataset, SemanticType, Value};
pub use ddl::{canonical_type, ToDdl};
pub use error::{DatasetError, DatasetLoadError, HandlerError, UnsupportedTypeError};
pub use handler::{replace_load, ConnectionDescriptor, DatabaseHandler, Engine, DEFAULT_TABLE};
pub use metrics::{BenchmarkRun, QueryMetrics};
pub use query::{Query, SqlDialect};
