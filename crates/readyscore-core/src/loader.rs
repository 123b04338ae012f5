use std::io::Read;
use std::path::Path;

use crate::dataset::{Column, Table};
use crate::error::{CoreError, Result};
use crate::value::Value;

/// Options for loading CSV files into a [`Table`].
#[derive(Debug, Clone)]
pub struct CsvOptions {
    pub delimiter: u8,
    /// Cell texts treated as missing (compared case-sensitively after trimming).
    pub null_markers: Vec<String>,
    /// Cell texts the source uses to mark "not applicable".
    ///
    /// Empty by default, in which case every absent value counts as missing.
    pub not_applicable_markers: Vec<String>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            null_markers: ["", "null", "NULL", "None", "NA", "N/A", "NaN", "nan"]
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
            not_applicable_markers: Vec::new(),
        }
    }
}

impl CsvOptions {
    fn parse_cell(&self, raw: &str) -> Value {
        let trimmed = raw.trim();
        if self
            .not_applicable_markers
            .iter()
            .any(|marker| marker == trimmed)
        {
            return Value::NotApplicable;
        }
        if self.null_markers.iter().any(|marker| marker == trimmed) {
            return Value::Null;
        }
        Value::infer(trimmed)
    }
}

impl Table {
    /// Load a CSV file with a header row.
    ///
    /// The table is named after the file stem and tagged with source type `csv`.
    pub fn from_csv_path(path: &Path, options: &CsvOptions) -> Result<Table> {
        let file = std::fs::File::open(path)?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Table::from_csv_reader(name, file, options)
    }

    /// Load CSV content from any reader.
    pub fn from_csv_reader<R: Read>(
        name: impl Into<String>,
        reader: R,
        options: &CsvOptions,
    ) -> Result<Table> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(options.delimiter)
            .flexible(true)
            .from_reader(reader);

        let headers = reader
            .headers()?
            .iter()
            .map(|header| header.trim().to_string())
            .collect::<Vec<_>>();
        if headers.is_empty() || headers.iter().all(|header| header.is_empty()) {
            return Err(CoreError::InvalidDataset(
                "csv input has no header row".to_string(),
            ));
        }

        let mut columns = headers
            .iter()
            .map(|header| Column::new(header.clone(), Vec::new()))
            .collect::<Vec<_>>();

        for result in reader.records() {
            let record = result?;
            for (idx, column) in columns.iter_mut().enumerate() {
                // short rows are padded with nulls, extra cells are dropped
                let value = match record.get(idx) {
                    Some(raw) => options.parse_cell(raw),
                    None => Value::Null,
                };
                column.values.push(value);
            }
        }

        Ok(Table::new(name, columns)?.with_source_type("csv"))
    }
}
