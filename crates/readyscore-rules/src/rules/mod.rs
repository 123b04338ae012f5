//! Built-in rules, one module per dimension.

use readyscore_core::{Dataset, Expr, ExprError, Scope, Value};

use crate::errors::RuleError;
use crate::registry::RuleRegistry;

pub mod completeness;
pub mod consistency;
pub mod freshness;
pub mod plausibility;
pub mod validity;

/// Default number of example values carried in findings and details.
pub const DEFAULT_MAX_EXAMPLES: usize = 5;

pub fn register(registry: &mut RuleRegistry) -> Result<(), RuleError> {
    validity::register(registry)?;
    completeness::register(registry)?;
    freshness::register(registry)?;
    consistency::register(registry)?;
    plausibility::register(registry)?;
    Ok(())
}

/// `good / total`, or 1.0 when there is nothing to count.
pub(crate) fn ratio(good: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        good as f64 / total as f64
    }
}

pub(crate) fn percent(good: usize, total: usize) -> String {
    format!("{:.1}%", ratio(good, total) * 100.0)
}

/// Configured columns resolved against the dataset, split into found and absent names.
pub(crate) fn resolve_columns<'d>(
    dataset: &'d dyn Dataset,
    configured: &[String],
) -> (Vec<&'d str>, Vec<String>) {
    let mut found = Vec::new();
    let mut absent = Vec::new();
    for column in configured {
        match dataset.resolve_column(column) {
            Some(name) => {
                if !found.contains(&name) {
                    found.push(name);
                }
            }
            None => absent.push(column.clone()),
        }
    }
    (found, absent)
}

/// Comma separated, quoted list for findings.
pub(crate) fn quoted_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| format!("'{}'", item.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Collects up to `limit` distinct rendered example values.
#[derive(Debug, Default)]
pub(crate) struct Examples {
    limit: usize,
    values: Vec<String>,
}

impl Examples {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit,
            values: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, value: String) {
        if self.values.len() < self.limit && !self.values.contains(&value) {
            self.values.push(value);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn joined(&self) -> String {
        self.values.join(", ")
    }

    pub(crate) fn into_vec(self) -> Vec<String> {
        self.values
    }
}

/// One row of a dataset seen as an expression scope.
pub(crate) struct RowScope<'a> {
    pub(crate) dataset: &'a dyn Dataset,
    pub(crate) row: usize,
}

impl Scope for RowScope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        let column = self.dataset.resolve_column(name)?;
        self.dataset
            .values(column)
            .and_then(|values| values.get(self.row))
            .cloned()
    }
}

/// Row-level outcome counts of a boolean expression.
#[derive(Debug, Default)]
pub(crate) struct RowTally {
    pub(crate) passed: usize,
    pub(crate) failed: usize,
    /// Rows where the outcome is unknown (nulls, division by zero).
    pub(crate) undecided: usize,
    pub(crate) failing_rows: Vec<usize>,
}

impl RowTally {
    pub(crate) fn decided(&self) -> usize {
        self.passed + self.failed
    }

    pub(crate) fn pass_ratio(&self) -> f64 {
        ratio(self.passed, self.decided())
    }
}

/// Identifiers of `expr` that do not name a dataset column.
pub(crate) fn missing_identifiers(dataset: &dyn Dataset, expr: &Expr) -> Vec<String> {
    let mut missing: Vec<String> = Vec::new();
    for ident in expr.identifiers() {
        if dataset.resolve_column(ident).is_none() && !missing.iter().any(|m| m == ident) {
            missing.push(ident.to_string());
        }
    }
    missing
}

/// Evaluate `expr` on every row. Type mismatches count as failures since they
/// come from the data; other evaluation errors leave the row undecided.
pub(crate) fn tally_rows(dataset: &dyn Dataset, expr: &Expr) -> RowTally {
    let mut tally = RowTally::default();
    for row in 0..dataset.row_count() {
        let scope = RowScope { dataset, row };
        match expr.evaluate_predicate(&scope) {
            Ok(Some(true)) => tally.passed += 1,
            Ok(Some(false)) | Err(ExprError::TypeMismatch(_)) => {
                tally.failed += 1;
                tally.failing_rows.push(row);
            }
            Ok(None) | Err(_) => tally.undecided += 1,
        }
    }
    tally
}

/// Parse an expression param, reporting failures as invalid params.
pub(crate) fn parse_rule_expression(rule_id: &str, source: &str) -> Result<Expr, RuleError> {
    readyscore_core::parse_expression(source).map_err(|err| {
        RuleError::invalid_params(rule_id, format!("invalid expression '{source}': {err}"))
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{NaiveDate, NaiveDateTime};
    use readyscore_core::Table;

    pub(crate) fn as_of() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 15)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .expect("valid as_of")
    }

    pub(crate) fn table(columns: &[&str], rows: &[Vec<&str>]) -> Table {
        Table::from_text_rows("test", columns, rows).expect("table")
    }
}

#[cfg(test)]
mod tests {
    use super::testing::table;
    use super::*;

    #[test]
    fn tallies_rows_with_unknowns() {
        let data = table(
            &["start", "end"],
            &[
                vec!["2024-01-01", "2024-01-05"],
                vec!["2024-02-01", "2024-01-05"],
                vec!["", "2024-01-05"],
            ],
        );
        let expr = readyscore_core::parse_expression("end >= start").expect("parse");
        let tally = tally_rows(&data, &expr);
        assert_eq!(tally.passed, 1);
        assert_eq!(tally.failed, 1);
        assert_eq!(tally.undecided, 1);
        assert_eq!(tally.failing_rows, vec![1]);
    }

    #[test]
    fn finds_missing_identifiers() {
        let data = table(&["price"], &[vec!["1"]]);
        let expr = readyscore_core::parse_expression("price < cost or price < limit")
            .expect("parse");
        assert_eq!(missing_identifiers(&data, &expr), vec!["cost", "limit"]);
    }
}
