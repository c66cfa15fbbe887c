//! DuckDB engine for db-bench.
//!
//! DuckDB is embedded, so the "server" is a Python container with the `duckdb`
//! package installed. Each connection keeps one `docker exec -i` driver session
//! open and exchanges JSON lines with it over stdin/stdout.

pub mod connection;
pub mod ddl;
pub mod driver;
pub mod error;
pub mod handler;

pub use connection::DuckDbConnection;
pub use ddl::DuckDbDdl;
pub use driver::{DriverMode, Request};
pub use error::DuckDbError;
pub use handler::{DuckDbHandler, DuckDbOptions, DuckDbProbe};
