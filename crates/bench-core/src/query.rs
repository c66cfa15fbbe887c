//! Benchmark queries and their per-engine SQL dialects.

use sqlparser::dialect::{ClickHouseDialect, Dialect, DuckDbDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use tracing::debug;

/// SQL dialect an engine speaks; used to render the recorded query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDialect {
    MySql,
    PostgreSql,
    ClickHouse,
    DuckDb,
}

impl SqlDialect {
    fn parser_dialect(self) -> Box<dyn Dialect> {
        match self {
            SqlDialect::MySql => Box::new(MySqlDialect {}),
            SqlDialect::PostgreSql => Box::new(PostgreSqlDialect {}),
            SqlDialect::ClickHouse => Box::new(ClickHouseDialect {}),
            SqlDialect::DuckDb => Box::new(DuckDbDialect {}),
        }
    }

    /// Parse `sql` with this dialect and render it back in canonical form.
    ///
    /// Statements the parser rejects come back trimmed but otherwise unchanged.
    pub fn normalize(self, sql: &str) -> String {
        let dialect = self.parser_dialect();
        match Parser::parse_sql(dialect.as_ref(), sql) {
            Ok(statements) if !statements.is_empty() => statements
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
            Ok(_) => sql.trim().to_string(),
            Err(e) => {
                debug!("Keeping query text as written ({:?}): {}", self, e);
                sql.trim().to_string()
            }
        }
    }
}

/// One query of the query set.
///
/// `text` is what gets executed, exactly as written apart from surrounding whitespace
/// and trailing semicolons; `original` is the query as it appeared in its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub original: String,
}

impl Query {
    /// Normalize `original`: trim whitespace and trailing semicolons.
    pub fn new(original: impl Into<String>) -> Self {
        let original = original.into();
        let text = original
            .trim()
            .trim_end_matches(';')
            .trim_end()
            .to_string();
        Self { text, original }
    }
}

impl From<&str> for Query {
    fn from(original: &str) -> Self {
        Query::new(original)
    }
}

impl From<String> for Query {
    fn from(original: String) -> Self {
        Query::new(original)
    }
}
