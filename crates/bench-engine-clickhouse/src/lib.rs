//! ClickHouse engine for db-bench.
//!
//! Talks to the server over its HTTP interface. Tables need an explicit
//! `MergeTree` engine clause, so loading creates the table first and then
//! appends rows as `JSONEachRow`.

pub mod client;
pub mod connection;
pub mod ddl;
pub mod error;
pub mod handler;

pub use client::ClickHouseClient;
pub use connection::ClickHouseConnection;
pub use ddl::ClickHouseDdl;
pub use error::ClickHouseError;
pub use handler::{ClickHouseHandler, ClickHouseOptions, ClickHouseProbe};
