//! PostgreSQL engine for db-bench.

pub mod connection;
pub mod ddl;
pub mod error;
pub mod handler;

pub use connection::PostgresConnection;
pub use ddl::PostgresDdl;
pub use error::PostgresError;
pub use handler::{PostgresHandler, PostgresOptions, PostgresProbe};
