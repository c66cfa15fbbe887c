//! MySQL DDL generation.

use bench_core::{SemanticType, ToDdl, UnsupportedTypeError};

/// MySQL DDL generator.
pub struct MySqlDdl;

impl ToDdl for MySqlDdl {
    fn column_type(&self, semantic_type: SemanticType) -> Result<String, UnsupportedTypeError> {
        let ddl = match semantic_type {
            SemanticType::Int8 => "TINYINT",
            SemanticType::Int16 => "SMALLINT",
            SemanticType::Int32 => "INT",
            SemanticType::Int64 => "BIGINT",
            SemanticType::UInt8 => "TINYINT UNSIGNED",
            SemanticType::UInt16 => "SMALLINT UNSIGNED",
            SemanticType::UInt32 => "INT UNSIGNED",
            SemanticType::UInt64 => "BIGINT UNSIGNED",
            SemanticType::Float32 => "FLOAT",
            SemanticType::Float64 => "DOUBLE",
            SemanticType::String => "TEXT",
            SemanticType::Date => "DATE",
            // MySQL max precision is 6
            SemanticType::DateTime => "DATETIME(6)",
            SemanticType::Boolean => "TINYINT(1)",
        };
        Ok(ddl.to_string())
    }

    fn quote(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }
}

impl MySqlDdl {
    /// Multi-row `INSERT` template with `rows` groups of `?` placeholders.
    pub fn to_insert(&self, table: &str, columns: &[&str], rows: usize) -> String {
        let placeholders = vec!["?"; columns.len()].join(", ");
        let row_template = format!("({placeholders})");
        let values = vec![row_template.as_str(); rows].join(", ");
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
