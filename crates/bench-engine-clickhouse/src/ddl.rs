//! ClickHouse DDL generation from dataset columns.

use bench_core::{canonical_type, Column, SemanticType, ToDdl, UnsupportedTypeError};

pub struct ClickHouseDdl;

impl ToDdl for ClickHouseDdl {
    fn column_type(&self, semantic_type: SemanticType) -> Result<String, UnsupportedTypeError> {
        canonical_type(semantic_type).map(str::to_string)
    }

    fn quote(&self, identifier: &str) -> String {
        identifier.to_string()
    }

    fn create_table(&self, table: &str, columns: &[Column]) -> Result<String, UnsupportedTypeError> {
        let clause = self.column_clause(columns)?;
        let order_by = columns
            .first()
            .map(|c| self.quote(&c.name))
            .unwrap_or_else(|| "tuple()".to_string());
        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({clause}) ENGINE = MergeTree ORDER BY {order_by}",
            self.quote(table)
        ))
    }
}

impl ClickHouseDdl {
    /// `INSERT` header for a `JSONEachRow` body.
    pub fn insert_statement(&self, table: &str) -> String {
        format!("INSERT INTO {} FORMAT JSONEachRow", self.quote(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_orders_by_first_column() {
        let columns = vec![
            Column::new("id", SemanticType::Int64),
            Column::new("name", SemanticType::String),
            Column::new("ts", SemanticType::DateTime),
        ];
        assert_eq!(
            ClickHouseDdl.create_table("data", &columns).unwrap(),
            "CREATE TABLE IF NOT EXISTS data (id Int64, name String, ts DateTime) ENGINE = MergeTree ORDER BY id"
        );
    }

    #[test]
    fn test_unsigned_and_float_columns() {
        let columns = vec![
            Column::new("u", SemanticType::UInt16),
            Column::new("f", SemanticType::Float32),
            Column::new("d", SemanticType::Date),
        ];
        assert_eq!(
            ClickHouseDdl.column_clause(&columns).unwrap(),
            "u UInt16, f Float32, d Date"
        );
    }

    #[test]
    fn test_boolean_is_unsupported() {
        let columns = vec![Column::new("flag", SemanticType::Boolean)];
        let err = ClickHouseDdl.create_table("data", &columns).unwrap_err();
        assert_eq!(err.type_name, "bool");
    }
}
