//! Builds the configured database handlers.

use crate::config::{BenchConfig, EngineConfig};
use bench_core::DatabaseHandler;
use bench_engine_clickhouse::ClickHouseHandler;
use bench_engine_duckdb::DuckDbHandler;
use bench_engine_mysql::MySqlHandler;
use bench_engine_postgresql::PostgresHandler;

pub type NamedHandler = (String, Box<dyn DatabaseHandler>);

/// One handler per configured entry, in configuration order.
///
/// The global `host` and `load.batch_size` override the per-engine values.
pub fn build_handlers(config: &BenchConfig) -> anyhow::Result<Vec<NamedHandler>> {
    let batch_size = config.load.batch_size;
    let mut handlers: Vec<NamedHandler> = Vec::with_capacity(config.handlers.len());

    for entry in &config.handlers {
        let handler: Box<dyn DatabaseHandler> = match entry.engine.clone() {
            EngineConfig::Mysql(mut options) => {
                options.host = config.host.clone();
                options.batch_size = batch_size.unwrap_or(options.batch_size);
                Box::new(MySqlHandler::new(options))
            }
            EngineConfig::Postgresql(mut options) => {
                options.host = config.host.clone();
                options.batch_size = batch_size.unwrap_or(options.batch_size);
                Box::new(PostgresHandler::new(options))
            }
            EngineConfig::Clickhouse(mut options) => {
                options.host = config.host.clone();
                options.batch_size = batch_size.unwrap_or(options.batch_size);
                Box::new(ClickHouseHandler::new(options))
            }
            EngineConfig::Duckdb(options) => Box::new(DuckDbHandler::new(options)?),
        };
        handlers.push((entry.name.clone(), handler));
    }
    Ok(handlers)
}
