//! Core contracts shared by the readyscore crates.
//!
//! This crate defines the quality dimensions, the cell value model, the
//! `Dataset` capability trait every tabular adapter implements, numeric
//! statistics, the restricted expression grammar, and the CSV loader.

pub mod dataset;
pub mod dimension;
pub mod error;
pub mod expr;
pub mod loader;
pub mod stats;
pub mod value;

pub use dataset::{Column, Dataset, Table};
pub use dimension::{Dimension, MAX_DIMENSION_SCORE, MAX_OVERALL_SCORE};
pub use error::{CoreError, Result};
pub use expr::{Expr, ExprError, Scope, parse_expression};
pub use loader::CsvOptions;
pub use stats::{NumericStats, quantile};
pub use value::{ColumnType, Value};
