use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A single cell of a tabular dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value.
    Null,
    /// Explicitly marked as not applicable by the data source.
    NotApplicable,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Infer a typed value from raw text.
    ///
    /// Order: bool, int, float, timestamp, date, text. Empty input is `Null`.
    pub fn infer(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Null;
        }
        if let Some(value) = parse_bool(trimmed) {
            return Value::Bool(value);
        }
        if let Ok(value) = trimmed.parse::<i64>() {
            return Value::Int(value);
        }
        if let Ok(value) = trimmed.parse::<f64>()
            && value.is_finite()
        {
            return Value::Float(value);
        }
        if let Some(value) = parse_timestamp(trimmed) {
            return Value::Timestamp(value);
        }
        if let Some(value) = parse_date(trimmed) {
            return Value::Date(value);
        }
        Value::Text(trimmed.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_not_applicable(&self) -> bool {
        matches!(self, Value::NotApplicable)
    }

    /// True for values that carry data (neither null nor not-applicable).
    pub fn is_present(&self) -> bool {
        !matches!(self, Value::Null | Value::NotApplicable)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Timestamp view of date-like values; text is parsed leniently.
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(value) => Some(*value),
            Value::Date(value) => Some(value.and_time(NaiveTime::MIN)),
            Value::Text(value) => parse_timestamp(value)
                .or_else(|| parse_date(value).map(|date| date.and_time(NaiveTime::MIN))),
            _ => None,
        }
    }

    /// Inferred type of this value, `None` for missing values.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null | Value::NotApplicable => None,
            Value::Bool(_) => Some(ColumnType::Boolean),
            Value::Int(_) => Some(ColumnType::Integer),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Text(_) => Some(ColumnType::Text),
            Value::Date(_) => Some(ColumnType::Date),
            Value::Timestamp(_) => Some(ColumnType::Timestamp),
        }
    }

    /// Text form used for examples and key comparison.
    pub fn render(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::NotApplicable => "n/a".to_string(),
            Value::Bool(value) => value.to_string(),
            Value::Int(value) => value.to_string(),
            Value::Float(value) => value.to_string(),
            Value::Text(value) => value.clone(),
            Value::Date(value) => value.format("%Y-%m-%d").to_string(),
            Value::Timestamp(value) => value.format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::infer(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Logical type of a value or a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Date,
    Timestamp,
    Text,
    /// No present values.
    Empty,
    /// No single type accepts every present value.
    Mixed,
}

impl ColumnType {
    const CANDIDATES: [ColumnType; 6] = [
        ColumnType::Integer,
        ColumnType::Float,
        ColumnType::Boolean,
        ColumnType::Date,
        ColumnType::Timestamp,
        ColumnType::Text,
    ];

    /// Parse a type name as written in configuration files.
    pub fn from_name(name: &str) -> Option<ColumnType> {
        match name.trim().to_lowercase().as_str() {
            "integer" | "int" | "bigint" | "smallint" => Some(ColumnType::Integer),
            "float" | "double" | "number" | "numeric" | "decimal" => Some(ColumnType::Float),
            "boolean" | "bool" => Some(ColumnType::Boolean),
            "date" => Some(ColumnType::Date),
            "timestamp" | "datetime" => Some(ColumnType::Timestamp),
            "text" | "string" | "str" => Some(ColumnType::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Text => "text",
            ColumnType::Empty => "empty",
            ColumnType::Mixed => "mixed",
        }
    }

    /// Whether a value of type `other` conforms to this type.
    ///
    /// Floats accept integers and timestamps accept dates.
    pub fn accepts(&self, other: ColumnType) -> bool {
        match (self, other) {
            (a, b) if *a == b => true,
            (ColumnType::Float, ColumnType::Integer) => true,
            (ColumnType::Timestamp, ColumnType::Date) => true,
            _ => false,
        }
    }

    /// Dominant type of a sequence of values and how many present values conform to it.
    ///
    /// The dominant type is the candidate accepting the most values; ties go to
    /// the narrower type. Returns `(Empty, 0)` when no value is present.
    pub fn dominant<'a>(values: impl IntoIterator<Item = &'a Value>) -> (ColumnType, usize) {
        let counts = Self::candidate_counts(values);
        let mut best = (ColumnType::Empty, 0usize);
        for (idx, candidate) in Self::CANDIDATES.iter().enumerate() {
            if counts[idx] > best.1 {
                best = (*candidate, counts[idx]);
            }
        }
        best
    }

    /// Type a column is meant to hold.
    ///
    /// Any value parsing as a stricter type than text makes the column typed:
    /// the result is then the dominant non-text type, and free text in it
    /// counts against conformance. Text only when nothing else parses.
    pub fn intended<'a>(values: impl IntoIterator<Item = &'a Value>) -> ColumnType {
        let counts = Self::candidate_counts(values);
        let mut best = (ColumnType::Empty, 0usize);
        for (idx, candidate) in Self::CANDIDATES.iter().enumerate() {
            if *candidate != ColumnType::Text && counts[idx] > best.1 {
                best = (*candidate, counts[idx]);
            }
        }
        if best.1 == 0 && counts[Self::TEXT_IDX] > 0 {
            return ColumnType::Text;
        }
        best.0
    }

    const TEXT_IDX: usize = 5;

    fn candidate_counts<'a>(values: impl IntoIterator<Item = &'a Value>) -> [usize; 6] {
        let mut counts = [0usize; 6];
        for value in values {
            if let Some(kind) = value.column_type() {
                for (idx, candidate) in Self::CANDIDATES.iter().enumerate() {
                    if candidate.accepts(kind) {
                        counts[idx] += 1;
                    }
                }
            }
        }
        counts
    }

    /// Infer the type of a whole column.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value> + Clone) -> ColumnType {
        let present = values
            .clone()
            .into_iter()
            .filter(|value| value.is_present())
            .count();
        if present == 0 {
            return ColumnType::Empty;
        }
        let (dominant, conforming) = Self::dominant(values);
        if conforming == present {
            dominant
        } else {
            ColumnType::Mixed
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Parse RFC 3339 and the common ISO-like timestamp layouts.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.naive_utc())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").ok())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").ok())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").ok())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").ok())
}

/// Parse ISO dates (`2024-01-31`) and slash-separated dates (`2024/01/31`).
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(value, "%Y/%m/%d").ok())
}
