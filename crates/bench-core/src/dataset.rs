//! Column-typed in-memory dataset.
//!
//! A [`Dataset`] is built once and only handed out by shared reference, so every
//! handler sees exactly the same rows.

use crate::error::{DatasetError, UnsupportedTypeError};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Semantic column type, independent of any engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    Date,
    DateTime,
    Boolean,
}

impl SemanticType {
    pub fn name(&self) -> &'static str {
        match self {
            SemanticType::Int8 => "int8",
            SemanticType::Int16 => "int16",
            SemanticType::Int32 => "int32",
            SemanticType::Int64 => "int64",
            SemanticType::UInt8 => "uint8",
            SemanticType::UInt16 => "uint16",
            SemanticType::UInt32 => "uint32",
            SemanticType::UInt64 => "uint64",
            SemanticType::Float32 => "float32",
            SemanticType::Float64 => "float64",
            SemanticType::String => "string",
            SemanticType::Date => "date",
            SemanticType::DateTime => "datetime",
            SemanticType::Boolean => "bool",
        }
    }

    /// Whether `value` can be stored in a column of this type, including the integer
    /// width. NULL fits everywhere.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (SemanticType::Int8, Value::Int(v)) => i8::try_from(*v).is_ok(),
            (SemanticType::Int16, Value::Int(v)) => i16::try_from(*v).is_ok(),
            (SemanticType::Int32, Value::Int(v)) => i32::try_from(*v).is_ok(),
            (SemanticType::Int64, Value::Int(_)) => true,
            (SemanticType::UInt8, Value::UInt(v)) => u8::try_from(*v).is_ok(),
            (SemanticType::UInt16, Value::UInt(v)) => u16::try_from(*v).is_ok(),
            (SemanticType::UInt32, Value::UInt(v)) => u32::try_from(*v).is_ok(),
            (SemanticType::UInt64, Value::UInt(_)) => true,
            (SemanticType::Float32 | SemanticType::Float64, Value::Float(_)) => true,
            (SemanticType::String, Value::Text(_)) => true,
            (SemanticType::Date, Value::Date(_)) => true,
            (SemanticType::DateTime, Value::DateTime(_)) => true,
            (SemanticType::Boolean, Value::Bool(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SemanticType {
    type Err = UnsupportedTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "int8" => Ok(SemanticType::Int8),
            "int16" => Ok(SemanticType::Int16),
            "int32" => Ok(SemanticType::Int32),
            "int64" => Ok(SemanticType::Int64),
            "uint8" => Ok(SemanticType::UInt8),
            "uint16" => Ok(SemanticType::UInt16),
            "uint32" => Ok(SemanticType::UInt32),
            "uint64" => Ok(SemanticType::UInt64),
            "float32" => Ok(SemanticType::Float32),
            "float64" => Ok(SemanticType::Float64),
            "string" | "text" | "object" => Ok(SemanticType::String),
            "date" => Ok(SemanticType::Date),
            "datetime" | "datetime64" | "datetime64[ns]" => Ok(SemanticType::DateTime),
            "bool" | "boolean" => Ok(SemanticType::Boolean),
            _ => Err(UnsupportedTypeError::new(s, "dataset")),
        }
    }
}

/// A single cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Bool(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Approximate in-memory size in bytes.
    pub fn approx_size(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Date(_) => 4,
            Value::Int(_) | Value::UInt(_) | Value::Float(_) | Value::DateTime(_) => 8,
            Value::Text(s) => s.len(),
        }
    }
}

/// Renders the value the way SQL engines parse it from text; NULL renders empty.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub semantic_type: SemanticType,
}

impl Column {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
        }
    }
}

/// Immutable tabular dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Build a dataset, checking that every row matches the column layout.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Result<Self, DatasetError> {
        if columns.is_empty() {
            return Err(DatasetError::NoColumns);
        }
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(DatasetError::DuplicateColumn(column.name.clone()));
            }
        }
        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DatasetError::RowWidth {
                    row: index,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
            for (column, value) in columns.iter().zip(row) {
                if !column.semantic_type.accepts(value) {
                    return Err(DatasetError::TypeMismatch {
                        row: index,
                        column: column.name.clone(),
                        expected: column.semantic_type,
                    });
                }
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> u64 {
        self.rows.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
