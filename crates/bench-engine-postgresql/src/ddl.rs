//! PostgreSQL DDL generation.

use bench_core::{SemanticType, ToDdl, UnsupportedTypeError};

/// PostgreSQL DDL generator.
///
/// PostgreSQL has no unsigned integers, so each unsigned type widens to the next
/// signed type (`uint64` to `NUMERIC(20,0)`).
pub struct PostgresDdl;

impl ToDdl for PostgresDdl {
    fn column_type(&self, semantic_type: SemanticType) -> Result<String, UnsupportedTypeError> {
        let ddl = match semantic_type {
            SemanticType::Int8 | SemanticType::Int16 | SemanticType::UInt8 => "SMALLINT",
            SemanticType::Int32 | SemanticType::UInt16 => "INTEGER",
            SemanticType::Int64 | SemanticType::UInt32 => "BIGINT",
            SemanticType::UInt64 => "NUMERIC(20,0)",
            SemanticType::Float32 => "REAL",
            SemanticType::Float64 => "DOUBLE PRECISION",
            SemanticType::String => "TEXT",
            SemanticType::Date => "DATE",
            SemanticType::DateTime => "TIMESTAMP",
            SemanticType::Boolean => "BOOLEAN",
        };
        Ok(ddl.to_string())
    }

    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }
}

impl PostgresDdl {
    /// Multi-row `INSERT` with numbered placeholders `$1..$n`.
    pub fn to_insert(&self, table: &str, columns: &[&str], rows: usize) -> String {
        let width = columns.len();
        let values = (0..rows)
            .map(|row| {
                let placeholders = (1..=width)
                    .map(|col| format!("${}", row * width + col))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({placeholders})")
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.quote(table),
            columns
                .iter()
                .map(|c| self.quote(c))
                .collect::<Vec<_>>()
                .join(", "),
            values
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_core::Column;

    #[test]
    fn test_create_table() {
        let columns = vec![
            Column::new("id", SemanticType::Int64),
            Column::new("amount", SemanticType::UInt64),
            Column::new("ts", SemanticType::DateTime),
        ];
        assert_eq!(
            PostgresDdl.create_table("data", &columns).unwrap(),
            "CREATE TABLE \"data\" (\"id\" BIGINT, \"amount\" NUMERIC(20,0), \"ts\" TIMESTAMP)"
        );
    }

    #[test]
    fn test_numbered_placeholders() {
        assert_eq!(
            PostgresDdl.to_insert("data", &["a", "b"], 2),
            "INSERT INTO \"data\" (\"a\", \"b\") VALUES ($1, $2), ($3, $4)"
        );
    }
}
