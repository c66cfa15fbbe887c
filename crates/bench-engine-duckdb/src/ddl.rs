//! DuckDB DDL generation.

use bench_core::{SemanticType, ToDdl, UnsupportedTypeError};

pub struct DuckDbDdl;

impl ToDdl for DuckDbDdl {
    fn column_type(&self, semantic_type: SemanticType) -> Result<String, UnsupportedTypeError> {
        let sql = match semantic_type {
            SemanticType::Int8 => "TINYINT",
            SemanticType::Int16 => "SMALLINT",
            SemanticType::Int32 => "INTEGER",
            SemanticType::Int64 => "BIGINT",
            SemanticType::UInt8 => "UTINYINT",
            SemanticType::UInt16 => "USMALLINT",
            SemanticType::UInt32 => "UINTEGER",
            SemanticType::UInt64 => "UBIGINT",
            SemanticType::Float32 => "FLOAT",
            SemanticType::Float64 => "DOUBLE",
            SemanticType::String => "VARCHAR",
            SemanticType::Date => "DATE",
            SemanticType::DateTime => "TIMESTAMP",
            SemanticType::Boolean => "BOOLEAN",
        };
        Ok(sql.to_string())
    }

    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }
}
