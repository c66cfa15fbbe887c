//! CSV dataset provider: reads a local file and infers column types.

use crate::config::DatasetConfig;
use anyhow::Context;
use bench_core::{Column, Dataset, SemanticType, Value};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use tracing::{debug, info};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Load the dataset described by `config`.
pub fn load_dataset(config: &DatasetConfig) -> anyhow::Result<Dataset> {
    let file = std::fs::File::open(&config.path)
        .with_context(|| format!("Failed to open dataset: {:?}", config.path))?;
    let dataset = read_dataset(file, config.has_header, &config.column_types)
        .with_context(|| format!("Failed to read dataset: {:?}", config.path))?;
    info!(
        "Loaded dataset {:?}: {} rows, {} columns",
        config.path,
        dataset.row_count(),
        dataset.columns().len()
    );
    Ok(dataset)
}

/// Parse CSV from `reader`. Types in `overrides` are keyed by normalized column name.
pub fn read_dataset<R: Read>(
    reader: R,
    has_header: bool,
    overrides: &BTreeMap<String, String>,
) -> anyhow::Result<Dataset> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(has_header)
        .from_reader(reader);

    let header: Vec<String> = if has_header {
        csv_reader
            .headers()
            .context("Failed to read CSV headers")?
            .iter()
            .map(|h| h.to_string())
            .collect()
    } else {
        Vec::new()
    };
    let records: Vec<csv::StringRecord> = csv_reader
        .records()
        .collect::<Result<_, _>>()
        .context("Failed to read CSV records")?;

    let width = if has_header {
        header.len()
    } else {
        records.first().map(|r| r.len()).unwrap_or(0)
    };
    let names = normalize_names(&header, width);

    let mut columns = Vec::with_capacity(width);
    for (index, name) in names.iter().enumerate() {
        let semantic_type = match overrides.get(name) {
            Some(type_name) => type_name.parse::<SemanticType>()?,
            None => infer_type(records.iter().filter_map(|r| r.get(index))),
        };
        debug!("Column '{}' is {}", name, semantic_type);
        columns.push(Column::new(name.clone(), semantic_type));
    }
    for name in overrides.keys() {
        if !names.contains(name) {
            anyhow::bail!("Type override for unknown column '{name}'");
        }
    }

    let mut rows = Vec::with_capacity(records.len());
    for (line, record) in records.iter().enumerate() {
        if record.len() != width {
            anyhow::bail!(
                "CSV row {} has {} fields, expected {}",
                line + 1,
                record.len(),
                width
            );
        }
        let row = columns
            .iter()
            .zip(record.iter())
            .map(|(column, cell)| {
                parse_cell(cell, column.semantic_type).with_context(|| {
                    format!(
                        "Row {}: cannot read '{}' as {} for column '{}'",
                        line + 1,
                        cell,
                        column.semantic_type,
                        column.name
                    )
                })
            })
            .collect::<anyhow::Result<Vec<Value>>>()?;
        rows.push(row);
    }

    Ok(Dataset::new(columns, rows)?)
}

/// Lower-case, keep ASCII alphanumerics and `_`; blanks become `colN`, repeats get a suffix.
pub fn normalize_names(header: &[String], width: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    (0..width)
        .map(|i| {
            let raw = header.get(i).map(String::as_str).unwrap_or("");
            let mut name: String = raw
                .to_lowercase()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            if name.is_empty() {
                name = format!("col{i}");
            }
            let base = name.clone();
            let mut suffix = 1;
            while !seen.insert(name.clone()) {
                name = format!("{base}_{suffix}");
                suffix += 1;
            }
            name
        })
        .collect()
}

/// Narrowest type that fits every non-empty cell: int64, float64, bool, date,
/// datetime, then string.
pub fn infer_type<'a>(cells: impl Iterator<Item = &'a str> + Clone) -> SemanticType {
    let mut values = cells.filter(|c| !c.trim().is_empty()).peekable();
    if values.peek().is_none() {
        return SemanticType::String;
    }
    let all = |check: fn(&str) -> bool| values.clone().all(|c| check(c.trim()));

    if all(|c| c.parse::<i64>().is_ok()) {
        SemanticType::Int64
    } else if all(|c| c.parse::<f64>().is_ok()) {
        SemanticType::Float64
    } else if all(|c| parse_bool(c).is_some()) {
        SemanticType::Boolean
    } else if all(|c| NaiveDate::parse_from_str(c, DATE_FORMAT).is_ok()) {
        SemanticType::Date
    } else if all(|c| parse_datetime(c).is_some()) {
        SemanticType::DateTime
    } else {
        SemanticType::String
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn parse_datetime(cell: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(cell, format).ok())
}

fn parse_cell(cell: &str, semantic_type: SemanticType) -> anyhow::Result<Value> {
    use SemanticType as T;

    let trimmed = cell.trim();
    if trimmed.is_empty() && semantic_type != T::String {
        return Ok(Value::Null);
    }
    if cell.is_empty() {
        return Ok(Value::Null);
    }

    let value = match semantic_type {
        T::Int8 => Value::Int(trimmed.parse::<i8>()?.into()),
        T::Int16 => Value::Int(trimmed.parse::<i16>()?.into()),
        T::Int32 => Value::Int(trimmed.parse::<i32>()?.into()),
        T::Int64 => Value::Int(trimmed.parse::<i64>()?),
        T::UInt8 => Value::UInt(trimmed.parse::<u8>()?.into()),
        T::UInt16 => Value::UInt(trimmed.parse::<u16>()?.into()),
        T::UInt32 => Value::UInt(trimmed.parse::<u32>()?.into()),
        T::UInt64 => Value::UInt(trimmed.parse::<u64>()?),
        T::Float32 | T::Float64 => Value::Float(trimmed.parse::<f64>()?),
        T::String => Value::Text(cell.to_string()),
        T::Date => Value::Date(NaiveDate::parse_from_str(trimmed, DATE_FORMAT)?),
        T::DateTime => Value::DateTime(
            parse_datetime(trimmed).ok_or_else(|| anyhow::anyhow!("not a datetime"))?,
        ),
        T::Boolean => Value::Bool(parse_bool(trimmed).ok_or_else(|| anyhow::anyhow!("not a bool"))?),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
ID,Full Name,Score,Active,Joined,Last Seen,
1,Ada,9.5,true,2024-01-02,2024-01-02 10:00:00,x
2,,7,FALSE,2024-02-03,2024-02-03T11:30:00.250,
3,Linus,,true,,2024-03-04 12:00:00,y
";

    fn dataset() -> Dataset {
        read_dataset(CSV.as_bytes(), true, &BTreeMap::new()).unwrap()
    }

    #[test]
    fn test_names_are_normalized() {
        assert_eq!(
            dataset().column_names(),
            vec!["id", "fullname", "score", "active", "joined", "lastseen", "col6"]
        );
    }

    #[test]
    fn test_types_are_inferred() {
        let types: Vec<SemanticType> = dataset()
            .columns()
            .iter()
            .map(|c| c.semantic_type)
            .collect();
        assert_eq!(
            types,
            vec![
                SemanticType::Int64,
                SemanticType::String,
                SemanticType::Float64,
                SemanticType::Boolean,
                SemanticType::Date,
                SemanticType::DateTime,
                SemanticType::String,
            ]
        );
    }

    #[test]
    fn test_empty_cells_are_null() {
        let data = dataset();
        let rows = data.rows();
        assert_eq!(rows[1][1], Value::Null);
        assert_eq!(rows[2][2], Value::Null);
        assert_eq!(rows[2][4], Value::Null);
        assert_eq!(rows[1][3], Value::Bool(false));
        assert_eq!(rows[1][2], Value::Float(7.0));
    }

    #[test]
    fn test_overrides_take_precedence() {
        let overrides = BTreeMap::from([("score".to_string(), "float32".to_string())]);
        let data = read_dataset("score\n1\n2\n".as_bytes(), true, &overrides).unwrap();
        assert_eq!(data.columns()[0].semantic_type, SemanticType::Float32);
        assert_eq!(data.rows()[0][0], Value::Float(1.0));
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let unknown_type = BTreeMap::from([("a".to_string(), "decimal".to_string())]);
        assert!(read_dataset("a\n1\n".as_bytes(), true, &unknown_type).is_err());

        let unknown_column = BTreeMap::from([("b".to_string(), "int64".to_string())]);
        assert!(read_dataset("a\n1\n".as_bytes(), true, &unknown_column).is_err());

        let out_of_range = BTreeMap::from([("a".to_string(), "uint8".to_string())]);
        assert!(read_dataset("a\n300\n".as_bytes(), true, &out_of_range).is_err());
    }

    #[test]
    fn test_headerless_file_gets_generated_names() {
        let data = read_dataset("1,a\n2,b\n".as_bytes(), false, &BTreeMap::new()).unwrap();
        assert_eq!(data.column_names(), vec!["col0", "col1"]);
        assert_eq!(data.row_count(), 2);
    }

    #[test]
    fn test_duplicate_names_get_suffixes() {
        let header = vec!["A".to_string(), "a".to_string(), "a!".to_string()];
        assert_eq!(normalize_names(&header, 3), vec!["a", "a_1", "a_2"]);
    }
}
