use regex::Regex;
use serde_json::json;

use readyscore_core::{ColumnType, Dataset, Dimension};

use crate::errors::RuleError;
use crate::params::{ParamKind, ParamSpec, RuleParams};
use crate::registry::{RuleRegistry, RuleSpec};
use crate::rule::{Rule, RuleContext, RuleDescriptor, RuleResult};
use crate::rules::{DEFAULT_MAX_EXAMPLES, Examples, percent, quoted_list, ratio};

pub fn register(registry: &mut RuleRegistry) -> Result<(), RuleError> {
    registry.register(RuleSpec {
        descriptor: &TYPE_CONSISTENCY,
        build: TypeConsistencyRule::build,
    })?;
    registry.register(RuleSpec {
        descriptor: &FORMAT_VALIDATION,
        build: FormatValidationRule::build,
    })?;
    registry.register(RuleSpec {
        descriptor: &RANGE_VALIDATION,
        build: RangeValidationRule::build,
    })?;
    Ok(())
}

static TYPE_CONSISTENCY_PARAMS: [ParamSpec; 1] =
    [ParamSpec::optional("expected_types", ParamKind::StringMap)];

static TYPE_CONSISTENCY: RuleDescriptor = RuleDescriptor {
    id: "validity.type_consistency",
    dimension: Dimension::Validity,
    name: "Type consistency",
    description: "Checks that every value of a column has the column's expected or intended type.",
    default_weight: 7.0,
    params: &TYPE_CONSISTENCY_PARAMS,
};

static FORMAT_VALIDATION_PARAMS: [ParamSpec; 2] = [
    ParamSpec::optional("formats", ParamKind::StringMap),
    ParamSpec::optional("patterns", ParamKind::StringMap),
];

static FORMAT_VALIDATION: RuleDescriptor = RuleDescriptor {
    id: "validity.format_validation",
    dimension: Dimension::Validity,
    name: "Format validation",
    description: "Checks values against well-known formats (email, url, uuid, ...) and custom patterns.",
    default_weight: 7.0,
    params: &FORMAT_VALIDATION_PARAMS,
};

static RANGE_VALIDATION_PARAMS: [ParamSpec; 1] =
    [ParamSpec::optional("ranges", ParamKind::Object)];

static RANGE_VALIDATION: RuleDescriptor = RuleDescriptor {
    id: "validity.range_validation",
    dimension: Dimension::Validity,
    name: "Range validation",
    description: "Checks numeric columns against configured minimum and maximum bounds.",
    default_weight: 6.0,
    params: &RANGE_VALIDATION_PARAMS,
};

struct TypeConsistencyRule {
    params: RuleParams,
    expected: Vec<(String, ColumnType)>,
}

impl TypeConsistencyRule {
    fn build(params: RuleParams) -> Result<Box<dyn Rule>, RuleError> {
        let mut expected = Vec::new();
        for (column, type_name) in params.get_string_map("expected_types").unwrap_or_default() {
            let Some(kind) = ColumnType::from_name(&type_name) else {
                return Err(RuleError::invalid_params(
                    TYPE_CONSISTENCY.id,
                    format!("unknown type '{type_name}' for column '{column}'"),
                ));
            };
            expected.push((column, kind));
        }
        Ok(Box::new(Self { params, expected }))
    }

    /// Columns to check with the type each must conform to.
    fn targets<'d>(
        &self,
        dataset: &'d dyn Dataset,
        result: &mut RuleResult,
    ) -> Vec<(&'d str, ColumnType)> {
        if self.expected.is_empty() {
            return dataset
                .column_names()
                .into_iter()
                .filter_map(|column| {
                    let values = dataset.values(column)?;
                    match ColumnType::intended(values) {
                        ColumnType::Empty => None,
                        kind => Some((column, kind)),
                    }
                })
                .collect();
        }

        let mut targets = Vec::new();
        for (column, kind) in &self.expected {
            match dataset.resolve_column(column) {
                Some(name) => targets.push((name, *kind)),
                None => result.add_finding(format!(
                    "column '{column}' with expected type {kind} is not present"
                )),
            }
        }
        targets
    }
}

impl Rule for TypeConsistencyRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &TYPE_CONSISTENCY
    }

    fn params(&self) -> &RuleParams {
        &self.params
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleResult, RuleError> {
        let dataset = ctx.dataset;
        let mut result = self.result_from_ratio(1.0);
        let targets = self.targets(dataset, &mut result);
        if !self.expected.is_empty() && targets.is_empty() {
            result.set_ratio(0.0);
            result.add_recommendation("Point expected_types at columns present in the dataset");
            return Ok(result);
        }

        let mut checked = 0usize;
        let mut conforming = 0usize;
        let mut offending_columns = Vec::new();
        for (column, kind) in targets {
            let Some(values) = dataset.values(column) else {
                continue;
            };
            let mut column_checked = 0usize;
            let mut column_ok = 0usize;
            let mut examples = Examples::new(DEFAULT_MAX_EXAMPLES);
            for value in values {
                let Some(actual) = value.column_type() else {
                    continue;
                };
                column_checked += 1;
                if kind.accepts(actual) {
                    column_ok += 1;
                } else {
                    examples.push(value.render());
                }
            }
            checked += column_checked;
            conforming += column_ok;
            if column_ok < column_checked {
                result.add_finding(format!(
                    "column '{column}' has {} of {column_checked} values not matching type {kind} (e.g. {})",
                    column_checked - column_ok,
                    examples.joined()
                ));
                offending_columns.push(column.to_string());
            }
        }

        if checked == 0 {
            result.add_finding("no typed values to check");
            return Ok(result);
        }

        result.set_ratio(ratio(conforming, checked));
        result.set_detail("checked_values", checked);
        result.set_detail("conforming_values", conforming);
        if !offending_columns.is_empty() {
            result.add_recommendation(format!(
                "Normalise {} to a single data type",
                quoted_list(&offending_columns)
            ));
            result.set_detail("inconsistent_columns", offending_columns);
        }
        Ok(result)
    }
}

/// Well-known value formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Email,
    Url,
    Uuid,
    Phone,
    IsoDate,
    PostalCode,
}

impl Format {
    fn from_name(name: &str) -> Option<Format> {
        match name.trim().to_lowercase().as_str() {
            "email" => Some(Format::Email),
            "url" => Some(Format::Url),
            "uuid" => Some(Format::Uuid),
            "phone" => Some(Format::Phone),
            "iso_date" | "date" => Some(Format::IsoDate),
            "postal_code" | "zip" => Some(Format::PostalCode),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Format::Email => "email",
            Format::Url => "url",
            Format::Uuid => "uuid",
            Format::Phone => "phone",
            Format::IsoDate => "iso_date",
            Format::PostalCode => "postal_code",
        }
    }

    fn pattern(&self) -> &'static str {
        match self {
            Format::Email => r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$",
            Format::Url => r"^(https?|ftp)://[^\s/$.?#][^\s]*$",
            Format::Uuid => {
                r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
            }
            Format::Phone => r"^\+?[0-9][0-9 ().-]{5,}[0-9]$",
            Format::IsoDate => {
                r"^\d{4}-\d{2}-\d{2}([T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?)?$"
            }
            Format::PostalCode => r"^[A-Za-z0-9][A-Za-z0-9 -]{1,8}[A-Za-z0-9]$",
        }
    }

    /// Format implied by a column name, used when nothing is configured.
    fn detect(column: &str) -> Option<Format> {
        let lowered = column.to_lowercase();
        if lowered.contains("email") {
            Some(Format::Email)
        } else if lowered.contains("url") || lowered.contains("website") {
            Some(Format::Url)
        } else if lowered.contains("uuid") || lowered.contains("guid") {
            Some(Format::Uuid)
        } else {
            None
        }
    }
}

struct FormatCheck {
    column: String,
    label: String,
    regex: Regex,
}

struct FormatValidationRule {
    params: RuleParams,
    /// Explicit checks; empty means detect from column names.
    checks: Vec<FormatCheck>,
}

impl FormatValidationRule {
    fn build(params: RuleParams) -> Result<Box<dyn Rule>, RuleError> {
        let id = FORMAT_VALIDATION.id;
        let mut checks = Vec::new();
        for (column, name) in params.get_string_map("formats").unwrap_or_default() {
            let Some(format) = Format::from_name(&name) else {
                return Err(RuleError::invalid_params(
                    id,
                    format!("unknown format '{name}' for column '{column}'"),
                ));
            };
            checks.push(FormatCheck {
                column,
                label: format.as_str().to_string(),
                regex: compile(id, format.pattern())?,
            });
        }
        for (column, pattern) in params.get_string_map("patterns").unwrap_or_default() {
            checks.push(FormatCheck {
                column,
                regex: compile(id, &format!("^(?:{pattern})$"))?,
                label: format!("pattern {pattern}"),
            });
        }
        Ok(Box::new(Self { params, checks }))
    }

    fn detected_checks(dataset: &dyn Dataset) -> Result<Vec<FormatCheck>, RuleError> {
        let mut checks = Vec::new();
        for column in dataset.column_names() {
            if let Some(format) = Format::detect(column) {
                checks.push(FormatCheck {
                    column: column.to_string(),
                    label: format.as_str().to_string(),
                    regex: compile(FORMAT_VALIDATION.id, format.pattern())?,
                });
            }
        }
        Ok(checks)
    }
}

fn compile(rule_id: &str, pattern: &str) -> Result<Regex, RuleError> {
    Regex::new(pattern)
        .map_err(|err| RuleError::invalid_params(rule_id, format!("invalid pattern: {err}")))
}

impl Rule for FormatValidationRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &FORMAT_VALIDATION
    }

    fn params(&self) -> &RuleParams {
        &self.params
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleResult, RuleError> {
        let dataset = ctx.dataset;
        let mut result = self.result_from_ratio(1.0);
        let detected;
        let checks = if self.checks.is_empty() {
            detected = Self::detected_checks(dataset)?;
            &detected
        } else {
            &self.checks
        };
        if checks.is_empty() {
            result.add_finding("no columns with a known format to validate");
            return Ok(result);
        }

        let mut resolved = 0usize;
        let mut checked = 0usize;
        let mut matched = 0usize;
        let mut columns = Vec::new();
        for check in checks {
            let Some(column) = dataset.resolve_column(&check.column) else {
                result.add_finding(format!(
                    "column '{}' configured for {} validation is not present",
                    check.column, check.label
                ));
                continue;
            };
            resolved += 1;
            let Some(values) = dataset.values(column) else {
                continue;
            };
            let mut column_checked = 0usize;
            let mut column_matched = 0usize;
            let mut examples = Examples::new(DEFAULT_MAX_EXAMPLES);
            for value in values.iter().filter(|value| value.is_present()) {
                column_checked += 1;
                let text = value.render();
                if check.regex.is_match(&text) {
                    column_matched += 1;
                } else {
                    examples.push(text);
                }
            }
            checked += column_checked;
            matched += column_matched;
            let invalid = column_checked - column_matched;
            columns.push(json!({
                "column": column,
                "format": check.label,
                "checked": column_checked,
                "invalid": invalid,
                "examples": examples.joined(),
            }));
            if invalid > 0 {
                result.add_finding(format!(
                    "column '{column}' has {invalid} of {column_checked} values not matching {} format (e.g. {})",
                    check.label,
                    examples.joined()
                ));
                result.add_recommendation(format!(
                    "Validate '{column}' against the {} format at the point of entry",
                    check.label
                ));
            }
        }

        if resolved == 0 {
            result.set_ratio(0.0);
            result.add_recommendation(
                "Point the format configuration at columns present in the dataset",
            );
            return Ok(result);
        }

        result.set_ratio(ratio(matched, checked));
        result.set_detail("checked_values", checked);
        result.set_detail("valid_values", matched);
        result.set_detail("columns", columns);
        Ok(result)
    }
}

struct RangeCheck {
    column: String,
    min: Option<f64>,
    max: Option<f64>,
}

impl RangeCheck {
    fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }

    fn describe(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("[{min}, {max}]"),
            (Some(min), None) => format!(">= {min}"),
            (None, Some(max)) => format!("<= {max}"),
            (None, None) => "any value".to_string(),
        }
    }
}

struct RangeValidationRule {
    params: RuleParams,
    ranges: Vec<RangeCheck>,
}

impl RangeValidationRule {
    fn build(params: RuleParams) -> Result<Box<dyn Rule>, RuleError> {
        let id = RANGE_VALIDATION.id;
        let mut ranges = Vec::new();
        if let Some(map) = params.get_object("ranges") {
            for (column, bounds) in map {
                let Some(bounds) = bounds.as_object() else {
                    return Err(RuleError::invalid_params(
                        id,
                        format!("range for '{column}' must be an object with min/max"),
                    ));
                };
                if let Some(key) = bounds.keys().find(|key| *key != "min" && *key != "max") {
                    return Err(RuleError::invalid_params(
                        id,
                        format!("unknown range key '{key}' for '{column}'"),
                    ));
                }
                let bound = |key: &str| -> Result<Option<f64>, RuleError> {
                    match bounds.get(key) {
                        None | Some(serde_json::Value::Null) => Ok(None),
                        Some(value) => value.as_f64().map(Some).ok_or_else(|| {
                            RuleError::invalid_params(
                                id,
                                format!("range {key} for '{column}' must be a number"),
                            )
                        }),
                    }
                };
                let check = RangeCheck {
                    column: column.clone(),
                    min: bound("min")?,
                    max: bound("max")?,
                };
                if let (Some(min), Some(max)) = (check.min, check.max)
                    && min > max
                {
                    return Err(RuleError::invalid_params(
                        id,
                        format!("range for '{column}' has min greater than max"),
                    ));
                }
                ranges.push(check);
            }
        }
        Ok(Box::new(Self { params, ranges }))
    }
}

impl Rule for RangeValidationRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &RANGE_VALIDATION
    }

    fn params(&self) -> &RuleParams {
        &self.params
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleResult, RuleError> {
        let dataset = ctx.dataset;
        let mut result = self.result_from_ratio(1.0);
        if self.ranges.is_empty() {
            result.add_finding("no value ranges configured");
            return Ok(result);
        }

        let mut resolved = 0usize;
        let mut checked = 0usize;
        let mut in_range = 0usize;
        for range in &self.ranges {
            let Some(column) = dataset.resolve_column(&range.column) else {
                result.add_finding(format!(
                    "column '{}' configured for range validation is not present",
                    range.column
                ));
                continue;
            };
            resolved += 1;
            let Some(values) = dataset.values(column) else {
                continue;
            };
            let mut column_checked = 0usize;
            let mut column_ok = 0usize;
            let mut examples = Examples::new(DEFAULT_MAX_EXAMPLES);
            for value in values.iter().filter(|value| value.is_present()) {
                column_checked += 1;
                match value.as_f64() {
                    Some(number) if range.contains(number) => column_ok += 1,
                    _ => examples.push(value.render()),
                }
            }
            checked += column_checked;
            in_range += column_ok;
            let out = column_checked - column_ok;
            if out > 0 {
                result.add_finding(format!(
                    "column '{column}' has {out} of {column_checked} values outside {} (e.g. {})",
                    range.describe(),
                    examples.joined()
                ));
                result.add_recommendation(format!(
                    "Review out-of-range values in '{column}' and enforce bounds {} upstream",
                    range.describe()
                ));
            }
        }

        if resolved == 0 {
            result.set_ratio(0.0);
            result.add_recommendation(
                "Point the range configuration at columns present in the dataset",
            );
            return Ok(result);
        }

        result.set_ratio(ratio(in_range, checked));
        result.set_detail("checked_values", checked);
        result.set_detail("in_range_values", in_range);
        if checked > 0 {
            result.set_detail("in_range_ratio", percent(in_range, checked));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::rules::testing::{as_of, table};

    fn run(id: &str, params: serde_json::Value, data: &dyn Dataset) -> RuleResult {
        let mut registry = RuleRegistry::new();
        register(&mut registry).expect("register");
        let rule = registry.get_rule(id, Some(&params)).expect("rule");
        rule.evaluate(&RuleContext::new(data, as_of()))
            .expect("evaluate")
    }

    #[test]
    fn type_consistency_uses_dominant_type() {
        let data = table(
            &["age", "name"],
            &[
                vec!["31", "ana"],
                vec!["40", "bruno"],
                vec!["forty", "carla"],
                vec!["22", "duda"],
            ],
        );
        let result = run("validity.type_consistency", json!({}), &data);
        assert!((result.score - 7.0 * 7.0 / 8.0).abs() < 1e-9);
        assert_eq!(result.findings.len(), 1);
        assert!(result.findings[0].contains("'age'"));
        assert!(result.findings[0].contains("forty"));
    }

    #[test]
    fn type_consistency_treats_free_text_in_numeric_columns_as_defects() {
        let before = table(
            &["age"],
            &[vec!["31"], vec!["40"], vec!["forty"], vec!["fifty"]],
        );
        let after = table(
            &["age"],
            &[vec!["31"], vec!["40"], vec!["forty"], vec!["fifty"], vec!["sixty"]],
        );
        let before = run("validity.type_consistency", json!({}), &before);
        let after = run("validity.type_consistency", json!({}), &after);
        assert!((before.score - 3.5).abs() < 1e-9);
        assert!((after.score - 7.0 * 2.0 / 5.0).abs() < 1e-9);
        assert!(after.score <= before.score);
    }

    #[test]
    fn type_consistency_honours_expected_types() {
        let data = table(&["zip"], &[vec!["1000"], vec!["2000"]]);
        let as_float = run(
            "validity.type_consistency",
            json!({"expected_types": {"zip": "float"}}),
            &data,
        );
        assert_eq!(as_float.score, 7.0);
        let as_bool = run(
            "validity.type_consistency",
            json!({"expected_types": {"zip": "boolean"}}),
            &data,
        );
        assert_eq!(as_bool.score, 0.0);
    }

    #[test]
    fn rejects_unknown_type_names() {
        let mut registry = RuleRegistry::new();
        register(&mut registry).expect("register");
        let result = registry.get_rule(
            "validity.type_consistency",
            Some(&json!({"expected_types": {"a": "blob"}})),
        );
        assert!(matches!(result, Err(RuleError::InvalidParams { .. })));
    }

    #[test]
    fn format_validation_detects_email_columns() {
        let data = table(
            &["email"],
            &[
                vec!["ana@example.com"],
                vec!["bruno@example"],
                vec![""],
                vec!["carla@example.org"],
            ],
        );
        let result = run("validity.format_validation", json!({}), &data);
        assert!((result.score - 7.0 * 2.0 / 3.0).abs() < 1e-9);
        assert!(result.findings[0].contains("bruno@example"));
    }

    #[test]
    fn format_validation_without_targets_scores_full() {
        let data = table(&["amount"], &[vec!["1"]]);
        let result = run("validity.format_validation", json!({}), &data);
        assert_eq!(result.score, 7.0);
        assert_eq!(result.findings.len(), 1);
    }

    #[test]
    fn configured_columns_that_are_all_absent_score_zero() {
        let data = table(&["amount"], &[vec!["1"], vec!["2"]]);
        let format = run(
            "validity.format_validation",
            json!({"formats": {"mail": "email"}}),
            &data,
        );
        assert_eq!(format.score, 0.0);
        assert!(format.findings[0].contains("'mail'"));

        let range = run(
            "validity.range_validation",
            json!({"ranges": {"amout": {"min": 0}}}),
            &data,
        );
        assert_eq!(range.score, 0.0);

        let types = run(
            "validity.type_consistency",
            json!({"expected_types": {"amout": "integer"}}),
            &data,
        );
        assert_eq!(types.score, 0.0);
    }

    #[test]
    fn format_validation_uses_custom_patterns() {
        let data = table(&["sku"], &[vec!["AB-1"], vec!["AB-2"], vec!["x"], vec!["AB-3"]]);
        let result = run(
            "validity.format_validation",
            json!({"patterns": {"sku": "AB-[0-9]+"}}),
            &data,
        );
        assert!((result.score - 7.0 * 0.75).abs() < 1e-9);
    }

    #[test]
    fn range_validation_counts_non_numeric_as_out_of_range() {
        let data = table(
            &["age"],
            &[vec!["30"], vec!["230"], vec!["n/a"], vec![""], vec!["45"]],
        );
        let result = run(
            "validity.range_validation",
            json!({"ranges": {"age": {"min": 0, "max": 120}}}),
            &data,
        );
        assert!((result.score - 6.0 * 2.0 / 4.0).abs() < 1e-9);
        assert!(result.findings[0].contains("230"));
    }

    #[test]
    fn range_validation_rejects_inverted_bounds() {
        let mut registry = RuleRegistry::new();
        register(&mut registry).expect("register");
        let result = registry.get_rule(
            "validity.range_validation",
            Some(&json!({"ranges": {"age": {"min": 10, "max": 1}}})),
        );
        assert!(matches!(result, Err(RuleError::InvalidParams { .. })));
    }
}
