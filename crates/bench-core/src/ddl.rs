//! DDL generation from semantic column types.

use crate::dataset::{Column, SemanticType};
use crate::error::UnsupportedTypeError;

/// Canonical semantic type to SQL type table.
///
/// Exact-match only: a type without an entry is an error, never a silent fallback.
pub fn canonical_type(semantic_type: SemanticType) -> Result<&'static str, UnsupportedTypeError> {
    match semantic_type {
        SemanticType::Int8 => Ok("Int8"),
        SemanticType::Int16 => Ok("Int16"),
        SemanticType::Int32 => Ok("Int32"),
        SemanticType::Int64 => Ok("Int64"),
        SemanticType::UInt8 => Ok("UInt8"),
        SemanticType::UInt16 => Ok("UInt16"),
        SemanticType::UInt32 => Ok("UInt32"),
        SemanticType::UInt64 => Ok("UInt64"),
        SemanticType::Float32 => Ok("Float32"),
        SemanticType::Float64 => Ok("Float64"),
        SemanticType::String => Ok("String"),
        SemanticType::Date => Ok("Date"),
        SemanticType::DateTime => Ok("DateTime"),
        SemanticType::Boolean => Err(UnsupportedTypeError::new(
            semantic_type.name(),
            "the canonical type table",
        )),
    }
}

/// Engine-specific DDL generator.
pub trait ToDdl {
    /// SQL type for a semantic type.
    fn column_type(&self, semantic_type: SemanticType) -> Result<String, UnsupportedTypeError>;

    /// Quote an identifier for this engine.
    fn quote(&self, identifier: &str) -> String;

    /// `name TYPE, name TYPE, ...` in column order.
    fn column_clause(&self, columns: &[Column]) -> Result<String, UnsupportedTypeError> {
        let defs = columns
            .iter()
            .map(|c| Ok(format!("{} {}", self.quote(&c.name), self.column_type(c.semantic_type)?)))
            .collect::<Result<Vec<_>, UnsupportedTypeError>>()?;
        Ok(defs.join(", "))
    }

    fn create_table(&self, table: &str, columns: &[Column]) -> Result<String, UnsupportedTypeError> {
        Ok(format!(
            "CREATE TABLE {} ({})",
            self.quote(table),
            self.column_clause(columns)?
        ))
    }

    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote(table))
    }
}
