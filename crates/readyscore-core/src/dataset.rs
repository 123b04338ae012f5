use std::collections::HashMap;

use crate::error::{CoreError, Result};
use crate::stats::NumericStats;
use crate::value::{ColumnType, Value};

/// Minimal capability interface every tabular adapter must satisfy.
///
/// Rules only see datasets through this trait, so any table representation
/// that can hand out column slices can be assessed.
pub trait Dataset {
    /// Human-readable source name (file name, table name, ...).
    fn name(&self) -> &str;

    /// Source kind, e.g. `csv` or `in_memory`.
    fn source_type(&self) -> &str {
        "in_memory"
    }

    fn row_count(&self) -> usize;

    /// Column names in source order.
    fn column_names(&self) -> Vec<&str>;

    /// All cells of a column, `None` when the column does not exist.
    fn values(&self, column: &str) -> Option<&[Value]>;

    fn has_column(&self, column: &str) -> bool {
        self.values(column).is_some()
    }

    fn column_count(&self) -> usize {
        self.column_names().len()
    }

    /// Resolve a column name case-insensitively, exact matches first.
    fn resolve_column(&self, column: &str) -> Option<&str> {
        let names = self.column_names();
        if let Some(name) = names.iter().find(|name| **name == column) {
            return Some(*name);
        }
        let lowered = column.to_lowercase();
        names
            .into_iter()
            .find(|name| name.to_lowercase() == lowered)
    }

    fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.values(column).map(|values| ColumnType::infer(values))
    }

    /// Number of null cells. Not-applicable cells are not counted.
    fn missing_count(&self, column: &str) -> Option<usize> {
        self.values(column)
            .map(|values| values.iter().filter(|value| value.is_null()).count())
    }

    /// Numeric cells of a column, skipping everything that is not a number.
    fn numeric_values(&self, column: &str) -> Option<Vec<f64>> {
        self.values(column)
            .map(|values| values.iter().filter_map(Value::as_f64).collect())
    }

    fn numeric_stats(&self, column: &str) -> Option<NumericStats> {
        self.numeric_values(column)
            .and_then(|values| NumericStats::from_values(&values))
    }
}

/// A named column of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// In-memory columnar table.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    source_type: String,
    columns: Vec<Column>,
    lookup: HashMap<String, usize>,
    row_count: usize,
}

impl Table {
    /// Build a table from columns; all columns must have the same length.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let name = name.into();
        let row_count = columns.first().map(|col| col.values.len()).unwrap_or(0);
        let mut lookup = HashMap::with_capacity(columns.len());

        for (idx, column) in columns.iter().enumerate() {
            if column.values.len() != row_count {
                return Err(CoreError::InvalidDataset(format!(
                    "column '{}' has {} value(s), expected {}",
                    column.name,
                    column.values.len(),
                    row_count
                )));
            }
            if lookup.insert(column.name.clone(), idx).is_some() {
                return Err(CoreError::InvalidDataset(format!(
                    "duplicate column name: {}",
                    column.name
                )));
            }
        }

        Ok(Self {
            name,
            source_type: "in_memory".to_string(),
            columns,
            lookup,
            row_count,
        })
    }

    /// Build a table from row-major values.
    pub fn from_rows(
        name: impl Into<String>,
        headers: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> Result<Self> {
        let mut columns: Vec<Column> = headers
            .iter()
            .map(|header| Column::new(*header, Vec::with_capacity(rows.len())))
            .collect();

        for (row_idx, row) in rows.into_iter().enumerate() {
            if row.len() != headers.len() {
                return Err(CoreError::InvalidDataset(format!(
                    "row {} has {} cell(s), expected {}",
                    row_idx + 1,
                    row.len(),
                    headers.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.values.push(value);
            }
        }

        Self::new(name, columns)
    }

    /// Build a table from raw text rows, inferring each cell's type.
    pub fn from_text_rows(
        name: impl Into<String>,
        headers: &[&str],
        rows: &[Vec<&str>],
    ) -> Result<Self> {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|cell| Value::infer(cell)).collect())
            .collect();
        Self::from_rows(name, headers, rows)
    }

    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = source_type.into();
        self
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

impl Dataset for Table {
    fn name(&self) -> &str {
        &self.name
    }

    fn source_type(&self) -> &str {
        &self.source_type
    }

    fn row_count(&self) -> usize {
        self.row_count
    }

    fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|col| col.name.as_str()).collect()
    }

    fn values(&self, column: &str) -> Option<&[Value]> {
        self.lookup
            .get(column)
            .map(|idx| self.columns[*idx].values.as_slice())
    }
}
