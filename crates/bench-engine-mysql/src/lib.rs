//! MySQL engine for db-bench.
//!
//! Runs the official `mysql` image, probes readiness with the in-container client
//! and loads datasets with batched multi-row `INSERT`s.

pub mod connection;
pub mod ddl;
pub mod error;
pub mod handler;

pub use connection::MySqlConnection;
pub use ddl::MySqlDdl;
pub use error::MySqlError;
pub use handler::{MySqlHandler, MySqlOptions, MySqlProbe};
