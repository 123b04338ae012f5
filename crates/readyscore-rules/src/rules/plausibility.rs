use serde_json::{Value as Json, json};

use readyscore_core::{ColumnType, Dataset, Dimension, Expr, NumericStats};

use crate::errors::RuleError;
use crate::params::{ParamKind, ParamSpec, RuleParams};
use crate::registry::{RuleRegistry, RuleSpec};
use crate::rule::{Rule, RuleContext, RuleDescriptor, RuleResult};
use crate::rules::{
    DEFAULT_MAX_EXAMPLES, Examples, RowScope, missing_identifiers, parse_rule_expression,
    quoted_list, ratio, resolve_columns, tally_rows,
};

/// Default Tukey fence multiplier.
pub const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;
/// Default z-score threshold.
pub const DEFAULT_ZSCORE_THRESHOLD: f64 = 3.0;
const DEFAULT_MIN_VALUES: usize = 4;

pub fn register(registry: &mut RuleRegistry) -> Result<(), RuleError> {
    registry.register(RuleSpec {
        descriptor: &OUTLIER_DETECTION,
        build: OutlierDetectionRule::build,
    })?;
    registry.register(RuleSpec {
        descriptor: &DOMAIN_SPECIFIC,
        build: DomainSpecificRule::build,
    })?;
    Ok(())
}

static OUTLIER_DETECTION_PARAMS: [ParamSpec; 5] = [
    ParamSpec::optional("method", ParamKind::String),
    ParamSpec::optional("multiplier", ParamKind::Float),
    ParamSpec::optional("threshold", ParamKind::Float),
    ParamSpec::optional("columns", ParamKind::StringList),
    ParamSpec::optional("min_values", ParamKind::Int),
];

static OUTLIER_DETECTION: RuleDescriptor = RuleDescriptor {
    id: "plausibility.outlier_detection",
    dimension: Dimension::Plausibility,
    name: "Outlier detection",
    description: "Flags numeric values outside Tukey fences (default) or beyond a z-score threshold.",
    default_weight: 10.0,
    params: &OUTLIER_DETECTION_PARAMS,
};

static DOMAIN_SPECIFIC_PARAMS: [ParamSpec; 2] = [
    ParamSpec::optional("rules", ParamKind::List),
    ParamSpec::optional("max_examples", ParamKind::Int),
];

static DOMAIN_SPECIFIC: RuleDescriptor = RuleDescriptor {
    id: "plausibility.domain_specific",
    dimension: Dimension::Plausibility,
    name: "Domain rules",
    description: "Evaluates business expressions such as price < 2000 on every row.",
    default_weight: 10.0,
    params: &DOMAIN_SPECIFIC_PARAMS,
};

#[derive(Debug, Clone, Copy, PartialEq)]
enum OutlierMethod {
    Iqr { multiplier: f64 },
    ZScore { threshold: f64 },
}

impl OutlierMethod {
    /// Accepted interval for a column, `None` when the column has no spread.
    fn bounds(&self, stats: &NumericStats) -> Option<(f64, f64)> {
        match *self {
            OutlierMethod::Iqr { multiplier } => {
                let iqr = stats.iqr();
                (iqr > 0.0).then(|| (stats.q1 - multiplier * iqr, stats.q3 + multiplier * iqr))
            }
            OutlierMethod::ZScore { threshold } => (stats.std_dev > 0.0).then(|| {
                (
                    stats.mean - threshold * stats.std_dev,
                    stats.mean + threshold * stats.std_dev,
                )
            }),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            OutlierMethod::Iqr { .. } => "iqr",
            OutlierMethod::ZScore { .. } => "zscore",
        }
    }
}

struct OutlierDetectionRule {
    params: RuleParams,
    method: OutlierMethod,
    columns: Option<Vec<String>>,
    min_values: usize,
}

impl OutlierDetectionRule {
    fn build(params: RuleParams) -> Result<Box<dyn Rule>, RuleError> {
        let id = OUTLIER_DETECTION.id;
        let method = match params.get_str("method").unwrap_or("iqr") {
            "iqr" => OutlierMethod::Iqr {
                multiplier: params.positive_f64(id, "multiplier", DEFAULT_IQR_MULTIPLIER)?,
            },
            "zscore" | "z_score" => OutlierMethod::ZScore {
                threshold: params.positive_f64(id, "threshold", DEFAULT_ZSCORE_THRESHOLD)?,
            },
            other => {
                return Err(RuleError::invalid_params(
                    id,
                    format!("unknown method '{other}' (expected iqr or zscore)"),
                ));
            }
        };
        let columns = params.get_string_list("columns");
        let min_values = params.get_usize("min_values").unwrap_or(DEFAULT_MIN_VALUES);
        Ok(Box::new(Self {
            params,
            method,
            columns,
            min_values,
        }))
    }

    fn target_columns<'d>(
        &self,
        dataset: &'d dyn Dataset,
        result: &mut RuleResult,
    ) -> Vec<&'d str> {
        match &self.columns {
            Some(configured) => {
                let (found, absent) = resolve_columns(dataset, configured);
                if !absent.is_empty() {
                    result.add_finding(format!(
                        "columns not present and skipped: {}",
                        quoted_list(&absent)
                    ));
                }
                found
            }
            None => dataset
                .column_names()
                .into_iter()
                .filter(|column| !is_key_like(column))
                .filter(|column| {
                    matches!(
                        dataset.column_type(column),
                        Some(ColumnType::Integer | ColumnType::Float)
                    )
                })
                .collect(),
        }
    }
}

fn is_key_like(column: &str) -> bool {
    let lowered = column.to_lowercase();
    lowered == "id" || lowered.ends_with("_id")
}

impl Rule for OutlierDetectionRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &OUTLIER_DETECTION
    }

    fn params(&self) -> &RuleParams {
        &self.params
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleResult, RuleError> {
        let dataset = ctx.dataset;
        let mut result = self.result_from_ratio(1.0);
        let columns = self.target_columns(dataset, &mut result);

        let mut checked = 0usize;
        let mut outliers = 0usize;
        let mut per_column = Vec::new();
        for column in columns {
            let values = dataset.numeric_values(column).unwrap_or_default();
            if values.len() < self.min_values {
                continue;
            }
            let Some(bounds) = NumericStats::from_values(&values)
                .and_then(|stats| self.method.bounds(&stats))
            else {
                continue;
            };
            let (low, high) = bounds;
            let mut examples = Examples::new(DEFAULT_MAX_EXAMPLES);
            let mut column_outliers = 0usize;
            for value in &values {
                if *value < low || *value > high {
                    column_outliers += 1;
                    examples.push(value.to_string());
                }
            }
            checked += values.len();
            outliers += column_outliers;
            per_column.push(json!({
                "column": column,
                "lower_bound": low,
                "upper_bound": high,
                "outliers": column_outliers,
            }));
            if column_outliers > 0 {
                result.add_finding(format!(
                    "column '{column}' has {column_outliers} outliers outside [{low:.2}, {high:.2}] (e.g. {})",
                    examples.joined()
                ));
                result.add_recommendation(format!(
                    "Verify extreme values in '{column}' with the data owner"
                ));
            }
        }

        if checked == 0 {
            result.add_finding("no numeric columns with enough values for outlier detection");
            return Ok(result);
        }
        result.set_ratio(ratio(checked - outliers, checked));
        result.set_detail("method", self.method.name());
        result.set_detail("checked_values", checked);
        result.set_detail("outlier_count", outliers);
        result.set_detail("columns", per_column);
        Ok(result)
    }
}

struct DomainRule {
    name: String,
    description: Option<String>,
    source: String,
    expr: Expr,
}

struct DomainSpecificRule {
    params: RuleParams,
    rules: Vec<DomainRule>,
    max_examples: usize,
}

impl DomainSpecificRule {
    fn build(params: RuleParams) -> Result<Box<dyn Rule>, RuleError> {
        let id = DOMAIN_SPECIFIC.id;
        let mut rules = Vec::new();
        for (idx, item) in params.get_list("rules").into_iter().flatten().enumerate() {
            let rule = match item {
                Json::String(source) => DomainRule {
                    name: source.clone(),
                    description: None,
                    expr: parse_rule_expression(id, source)?,
                    source: source.clone(),
                },
                Json::Object(map) => {
                    if let Some(key) = map
                        .keys()
                        .find(|key| !matches!(key.as_str(), "expression" | "name" | "description"))
                    {
                        return Err(RuleError::invalid_params(
                            id,
                            format!("rules[{idx}]: unknown key '{key}'"),
                        ));
                    }
                    let Some(source) = map.get("expression").and_then(Json::as_str) else {
                        return Err(RuleError::invalid_params(
                            id,
                            format!("rules[{idx}]: expression must be a string"),
                        ));
                    };
                    DomainRule {
                        name: map
                            .get("name")
                            .and_then(Json::as_str)
                            .unwrap_or(source)
                            .to_string(),
                        description: map
                            .get("description")
                            .and_then(Json::as_str)
                            .map(str::to_string),
                        expr: parse_rule_expression(id, source)?,
                        source: source.to_string(),
                    }
                }
                _ => {
                    return Err(RuleError::invalid_params(
                        id,
                        format!("rules[{idx}] must be an expression or an object"),
                    ));
                }
            };
            rules.push(rule);
        }
        let max_examples = params
            .get_usize("max_examples")
            .unwrap_or(DEFAULT_MAX_EXAMPLES);
        Ok(Box::new(Self {
            params,
            rules,
            max_examples,
        }))
    }

    /// Rendered values of the referenced columns on a failing row.
    fn example(&self, dataset: &dyn Dataset, rule: &DomainRule, row: usize) -> String {
        let scope = RowScope { dataset, row };
        let idents = rule.expr.identifiers();
        let rendered: Vec<String> = idents
            .iter()
            .map(|ident| {
                let value = readyscore_core::Scope::lookup(&scope, ident)
                    .map(|value| value.render())
                    .unwrap_or_default();
                if idents.len() == 1 {
                    value
                } else {
                    format!("{ident}={value}")
                }
            })
            .collect();
        rendered.join(" ")
    }
}

impl Rule for DomainSpecificRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &DOMAIN_SPECIFIC
    }

    fn params(&self) -> &RuleParams {
        &self.params
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleResult, RuleError> {
        let dataset = ctx.dataset;
        let mut result = self.result_from_ratio(1.0);
        let mut ratios = Vec::new();
        let mut outcomes = Vec::new();
        let mut failure_count = 0usize;
        for rule in &self.rules {
            let missing = missing_identifiers(dataset, &rule.expr);
            if !missing.is_empty() {
                result.add_finding(format!(
                    "domain rule '{}' skipped: columns not present: {}",
                    rule.name,
                    quoted_list(&missing)
                ));
                continue;
            }

            let tally = tally_rows(dataset, &rule.expr);
            let mut examples = Examples::new(self.max_examples);
            for row in &tally.failing_rows {
                examples.push(self.example(dataset, rule, *row));
            }
            failure_count += tally.failed;
            ratios.push(tally.pass_ratio());

            if tally.failed > 0 {
                result.add_finding(format!(
                    "domain rule '{}' failed for {} of {} rows (e.g. {})",
                    rule.name,
                    tally.failed,
                    tally.decided(),
                    examples.joined()
                ));
                let action = rule
                    .description
                    .as_deref()
                    .map(|description| {
                        format!("Review rows violating '{}': {description}", rule.name)
                    })
                    .unwrap_or_else(|| format!("Review rows violating '{}'", rule.name));
                result.add_recommendation(action);
            }
            outcomes.push(json!({
                "name": rule.name,
                "expression": rule.source,
                "passed": tally.passed,
                "failure_count": tally.failed,
                "undecided": tally.undecided,
                "examples": examples.into_vec(),
            }));
        }

        if ratios.is_empty() {
            result.add_finding("no domain rules to evaluate");
            return Ok(result);
        }
        result.set_ratio(ratios.iter().sum::<f64>() / ratios.len() as f64);
        result.set_detail("failure_count", failure_count);
        result.set_detail("rules", outcomes);
        Ok(result)
    }
}
