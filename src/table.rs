// src/table.rs

use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// A single attribute value extracted from a dataset. Source data is typed
/// dynamically; population columns in particular show up as strings, ints,
/// or floats depending on the state that published them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Null,
}

impl Value {
    /// Truthiness in the sense the completeness checks use it: null, the
    /// empty string, and numeric zero all count as missing.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Str(s) => !s.is_empty(),
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
        }
    }

    /// Numeric view of the value, parsing numeric-looking strings as well.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            Value::Null => None,
        }
    }

    /// Key form of the value, as used for grouping rows by geographic unit.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::Str(s) if !s.is_empty() => Some(s.clone()),
            Value::Int(n) => Some(n.to_string()),
            Value::Float(f) => Some(format!("{}", *f as i64)),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{}", s),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Null => write!(f, ""),
        }
    }
}

/// One dataset row: a mapping from column name to scalar value.
pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("column `{0}` is not present in the table")]
    MissingColumn(String),
}

/// Read-only view over an extracted tabular dataset. Shapefile parsing is a
/// collaborator concern; the checks only ever consume this interface.
pub trait GeoTable {
    /// Names of all columns present in the table.
    fn columns(&self) -> Vec<String>;

    /// All values of one column, in row order. Referencing a column the
    /// table does not have is a configuration error, not a data error.
    fn column_values(&self, name: &str) -> Result<Vec<Value>, TableError>;

    /// Row iteration in source order.
    fn rows(&self) -> Box<dyn Iterator<Item = &Row> + '_>;

    fn row_count(&self) -> usize;
}

/// In-memory `GeoTable`, loadable from a JSON array of records (the shape a
/// shapefile-extraction collaborator hands over).
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    rows: Vec<Row>,
}

impl MemoryTable {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Parse a JSON document of the form `[{"col": value, ...}, ...]`.
    pub fn from_json_records(json: &str) -> serde_json::Result<Self> {
        let rows: Vec<Row> = serde_json::from_str(json)?;
        Ok(Self { rows })
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }
}

impl GeoTable for MemoryTable {
    fn columns(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .rows
            .iter()
            .flat_map(|r| r.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn column_values(&self, name: &str) -> Result<Vec<Value>, TableError> {
        if !self.rows.iter().any(|r| r.contains_key(name)) {
            return Err(TableError::MissingColumn(name.to_string()));
        }
        Ok(self
            .rows
            .iter()
            .map(|r| r.get(name).cloned().unwrap_or(Value::Null))
            .collect())
    }

    fn rows(&self) -> Box<dyn Iterator<Item = &Row> + '_> {
        Box::new(self.rows.iter())
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_json_records_round_trip() -> Result<()> {
        let json = r#"[
            {"COUNTYFP10": "001", "NAME10": "Alpha", "TOTPOP": 100},
            {"COUNTYFP10": "002", "NAME10": "Beta", "TOTPOP": 52.5}
        ]"#;
        let table = MemoryTable::from_json_records(json)?;
        assert_eq!(table.row_count(), 2);
        assert_eq!(
            table.column_values("TOTPOP")?,
            vec![Value::Int(100), Value::Float(52.5)]
        );
        assert_eq!(
            table.columns(),
            vec!["COUNTYFP10".to_string(), "NAME10".to_string(), "TOTPOP".to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let table = MemoryTable::from_json_records(r#"[{"A": 1}]"#).unwrap();
        assert!(matches!(
            table.column_values("B"),
            Err(TableError::MissingColumn(_))
        ));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(Value::Str("001".into()).is_truthy());
        assert!(Value::Float(0.5).is_truthy());
    }

    #[test]
    fn test_numeric_strings_parse() {
        assert_eq!(Value::Str("4052".into()).as_f64(), Some(4052.0));
        assert_eq!(Value::Str("n/a".into()).as_f64(), None);
    }
}
