use std::collections::{BTreeMap, HashMap};

use serde_json::json;

use readyscore_core::{ColumnType, Dataset, Dimension, Expr};

use crate::errors::RuleError;
use crate::params::{ParamKind, ParamSpec, RuleParams};
use crate::registry::{RuleRegistry, RuleSpec};
use crate::rule::{Rule, RuleContext, RuleDescriptor, RuleResult};
use crate::rules::{
    DEFAULT_MAX_EXAMPLES, Examples, missing_identifiers, parse_rule_expression, quoted_list,
    ratio, resolve_columns, tally_rows,
};

pub fn register(registry: &mut RuleRegistry) -> Result<(), RuleError> {
    registry.register(RuleSpec {
        descriptor: &CROSS_FIELD,
        build: CrossFieldRule::build,
    })?;
    registry.register(RuleSpec {
        descriptor: &UNIFORM_REPRESENTATION,
        build: UniformRepresentationRule::build,
    })?;
    registry.register(RuleSpec {
        descriptor: &KEY_UNIQUENESS,
        build: KeyUniquenessRule::build,
    })?;
    Ok(())
}

static CROSS_FIELD_PARAMS: [ParamSpec; 1] = [ParamSpec::optional("checks", ParamKind::StringList)];

static CROSS_FIELD: RuleDescriptor = RuleDescriptor {
    id: "consistency.cross_field",
    dimension: Dimension::Consistency,
    name: "Cross-field consistency",
    description: "Evaluates row-level relationships between columns, e.g. end_date >= start_date.",
    default_weight: 7.0,
    params: &CROSS_FIELD_PARAMS,
};

static UNIFORM_REPRESENTATION_PARAMS: [ParamSpec; 2] = [
    ParamSpec::optional("columns", ParamKind::StringList),
    ParamSpec::optional("max_examples", ParamKind::Int),
];

static UNIFORM_REPRESENTATION: RuleDescriptor = RuleDescriptor {
    id: "consistency.uniform_representation",
    dimension: Dimension::Consistency,
    name: "Uniform representation",
    description: "Detects the same value written with different letter casing.",
    default_weight: 7.0,
    params: &UNIFORM_REPRESENTATION_PARAMS,
};

static KEY_UNIQUENESS_PARAMS: [ParamSpec; 1] =
    [ParamSpec::optional("columns", ParamKind::StringList)];

static KEY_UNIQUENESS: RuleDescriptor = RuleDescriptor {
    id: "consistency.key_uniqueness",
    dimension: Dimension::Consistency,
    name: "Key uniqueness",
    description: "Checks that key columns identify each row exactly once.",
    default_weight: 6.0,
    params: &KEY_UNIQUENESS_PARAMS,
};

struct CrossFieldCheck {
    source: String,
    expr: Expr,
}

struct CrossFieldRule {
    params: RuleParams,
    checks: Vec<CrossFieldCheck>,
}

impl CrossFieldRule {
    fn build(params: RuleParams) -> Result<Box<dyn Rule>, RuleError> {
        let checks = params
            .get_string_list("checks")
            .unwrap_or_default()
            .into_iter()
            .map(|source| {
                let expr = parse_rule_expression(CROSS_FIELD.id, &source)?;
                Ok(CrossFieldCheck { source, expr })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;
        Ok(Box::new(Self { params, checks }))
    }
}

impl Rule for CrossFieldRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &CROSS_FIELD
    }

    fn params(&self) -> &RuleParams {
        &self.params
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleResult, RuleError> {
        let dataset = ctx.dataset;
        let mut result = self.result_from_ratio(1.0);
        let mut ratios = Vec::new();
        let mut outcomes = Vec::new();
        for check in &self.checks {
            let missing = missing_identifiers(dataset, &check.expr);
            if !missing.is_empty() {
                result.add_finding(format!(
                    "check '{}' skipped: columns not present: {}",
                    check.source,
                    quoted_list(&missing)
                ));
                continue;
            }

            let tally = tally_rows(dataset, &check.expr);
            ratios.push(tally.pass_ratio());
            outcomes.push(json!({
                "check": check.source,
                "passed": tally.passed,
                "failed": tally.failed,
                "undecided": tally.undecided,
            }));
            if tally.failed > 0 {
                let rows: Vec<String> = tally
                    .failing_rows
                    .iter()
                    .take(DEFAULT_MAX_EXAMPLES)
                    .map(|row| (row + 1).to_string())
                    .collect();
                result.add_finding(format!(
                    "check '{}' failed for {} of {} rows (rows {})",
                    check.source,
                    tally.failed,
                    tally.decided(),
                    rows.join(", ")
                ));
                result.add_recommendation(format!(
                    "Correct rows violating '{}' and validate the relationship on write",
                    check.source
                ));
            }
        }

        if ratios.is_empty() {
            result.add_finding("no cross-field checks to evaluate");
            return Ok(result);
        }
        result.set_ratio(ratios.iter().sum::<f64>() / ratios.len() as f64);
        result.set_detail("checks", outcomes);
        Ok(result)
    }
}

struct UniformRepresentationRule {
    params: RuleParams,
    columns: Option<Vec<String>>,
    max_examples: usize,
}

impl UniformRepresentationRule {
    fn build(params: RuleParams) -> Result<Box<dyn Rule>, RuleError> {
        let columns = params.get_string_list("columns");
        let max_examples = params
            .get_usize("max_examples")
            .unwrap_or(DEFAULT_MAX_EXAMPLES);
        Ok(Box::new(Self {
            params,
            columns,
            max_examples,
        }))
    }
}

/// Spelling groups of one column: lower-cased value -> raw spelling -> count.
///
/// Cells arrive trimmed from the loaders, so casing is the only variation left.
fn spelling_groups<'v>(
    values: impl Iterator<Item = &'v str>,
) -> BTreeMap<String, BTreeMap<&'v str, usize>> {
    let mut groups: BTreeMap<String, BTreeMap<&str, usize>> = BTreeMap::new();
    for raw in values {
        let normalised = raw.to_lowercase();
        *groups.entry(normalised).or_default().entry(raw).or_default() += 1;
    }
    groups
}

impl Rule for UniformRepresentationRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &UNIFORM_REPRESENTATION
    }

    fn params(&self) -> &RuleParams {
        &self.params
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleResult, RuleError> {
        let dataset = ctx.dataset;
        let mut result = self.result_from_ratio(1.0);
        let columns: Vec<&str> = match &self.columns {
            Some(configured) => {
                let (found, absent) = resolve_columns(dataset, configured);
                if !absent.is_empty() {
                    result.add_finding(format!(
                        "columns not present and skipped: {}",
                        quoted_list(&absent)
                    ));
                }
                if found.is_empty() && !configured.is_empty() {
                    result.set_ratio(0.0);
                    result.add_recommendation(
                        "Point the columns setting at text columns present in the dataset",
                    );
                    return Ok(result);
                }
                found
            }
            None => dataset
                .column_names()
                .into_iter()
                .filter(|column| dataset.column_type(column) == Some(ColumnType::Text))
                .collect(),
        };

        let mut text_cells = 0usize;
        let mut inconsistent = 0usize;
        for column in columns {
            let Some(values) = dataset.values(column) else {
                continue;
            };
            let texts: Vec<&str> = values.iter().filter_map(|value| value.as_str()).collect();
            text_cells += texts.len();

            let mut examples = Examples::new(self.max_examples);
            let mut column_inconsistent = 0usize;
            for spellings in spelling_groups(texts.into_iter()).values() {
                if spellings.len() < 2 {
                    continue;
                }
                // The most frequent spelling is canonical; ties go to the first in order.
                let canonical = spellings
                    .iter()
                    .fold(None::<(&str, usize)>, |best, (raw, count)| match best {
                        Some((_, best_count)) if best_count >= *count => best,
                        _ => Some((*raw, *count)),
                    })
                    .map(|(raw, _)| raw);
                for (raw, count) in spellings {
                    if Some(*raw) != canonical {
                        column_inconsistent += count;
                        examples.push(format!("'{raw}'"));
                    }
                }
            }

            if column_inconsistent > 0 {
                inconsistent += column_inconsistent;
                result.add_finding(format!(
                    "column '{column}' has {column_inconsistent} values with variant spellings ({})",
                    examples.joined()
                ));
                result.add_recommendation(format!(
                    "Standardise the casing of '{column}' values"
                ));
            }
        }

        if text_cells == 0 {
            result.add_finding("no text values to compare");
            return Ok(result);
        }
        result.set_ratio(ratio(text_cells - inconsistent, text_cells));
        result.set_detail("text_cells", text_cells);
        result.set_detail("inconsistent_cells", inconsistent);
        Ok(result)
    }
}

struct KeyUniquenessRule {
    params: RuleParams,
    columns: Option<Vec<String>>,
}

impl KeyUniquenessRule {
    fn build(params: RuleParams) -> Result<Box<dyn Rule>, RuleError> {
        let columns = params.get_string_list("columns");
        Ok(Box::new(Self { params, columns }))
    }

    /// Configured key columns, else `id`, else the first `*_id` column.
    ///
    /// Fails with the absent names when a configured key column is missing.
    fn key_columns<'d>(&self, dataset: &'d dyn Dataset) -> Result<Vec<&'d str>, Vec<String>> {
        if let Some(configured) = &self.columns {
            let (found, absent) = resolve_columns(dataset, configured);
            if !absent.is_empty() {
                return Err(absent);
            }
            return Ok(found);
        }
        Ok(dataset
            .resolve_column("id")
            .or_else(|| {
                dataset
                    .column_names()
                    .into_iter()
                    .find(|name| name.to_lowercase().ends_with("_id"))
            })
            .into_iter()
            .collect())
    }
}

impl Rule for KeyUniquenessRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &KEY_UNIQUENESS
    }

    fn params(&self) -> &RuleParams {
        &self.params
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleResult, RuleError> {
        let dataset = ctx.dataset;
        let mut result = self.result_from_ratio(1.0);
        let keys = match self.key_columns(dataset) {
            Ok(keys) => keys,
            Err(absent) => {
                result.set_ratio(0.0);
                result.add_finding(format!("key columns not present: {}", quoted_list(&absent)));
                result.add_recommendation(
                    "Point the key configuration at columns present in the dataset",
                );
                return Ok(result);
            }
        };
        if keys.is_empty() {
            result.add_finding("no key columns to check");
            return Ok(result);
        }
        let columns: Vec<&[readyscore_core::Value]> = keys
            .iter()
            .filter_map(|column| dataset.values(column))
            .collect();

        let mut seen: HashMap<Vec<String>, usize> = HashMap::new();
        let mut missing_keys = 0usize;
        for row in 0..dataset.row_count() {
            let key: Option<Vec<String>> = columns
                .iter()
                .map(|values| {
                    values
                        .get(row)
                        .filter(|value| value.is_present())
                        .map(|value| value.render())
                })
                .collect();
            match key {
                Some(key) => *seen.entry(key).or_default() += 1,
                None => missing_keys += 1,
            }
        }

        let keyed_rows: usize = seen.values().sum();
        let unique = seen.len();
        let mut duplicates: Vec<String> = seen
            .iter()
            .filter(|(_, count)| **count > 1)
            .map(|(key, _)| key.join("|"))
            .collect();
        duplicates.sort();

        result.set_ratio(ratio(unique, keyed_rows));
        result.set_detail("key_columns", keys.iter().map(|k| k.to_string()).collect::<Vec<_>>());
        result.set_detail("keyed_rows", keyed_rows);
        result.set_detail("unique_keys", unique);
        if !duplicates.is_empty() {
            let mut examples = Examples::new(DEFAULT_MAX_EXAMPLES);
            for key in &duplicates {
                examples.push(key.clone());
            }
            result.add_finding(format!(
                "key {} has {} duplicated values (e.g. {})",
                quoted_list(&keys),
                duplicates.len(),
                examples.joined()
            ));
            result.add_recommendation("Deduplicate rows or enforce a unique constraint on the key");
            result.set_detail("duplicate_keys", examples.into_vec());
        }
        if missing_keys > 0 {
            result.add_finding(format!(
                "{missing_keys} rows have no value for key {}",
                quoted_list(&keys)
            ));
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
    fn cross_field_averages_checks() {
        let data = table(
            &["start", "end", "qty"],
            &[
                vec!["2024-01-01", "2024-01-02", "1"],
                vec!["2024-01-05", "2024-01-02", "2"],
            ],
        );
        let result = run(
            "consistency.cross_field",
            json!({"checks": ["end >= start", "qty > 0"]}),
            &data,
        );
        assert!((result.score - 7.0 * 0.75).abs() < 1e-9);
        assert!(result.findings[0].contains("rows 2"));
    }

    #[test]
    fn cross_field_skips_checks_on_absent_columns() {
        let data = table(&["qty"], &[vec!["1"]]);
        let result = run(
            "consistency.cross_field",
            json!({"checks": ["shipped >= ordered"]}),
            &data,
        );
        assert_eq!(result.score, 7.0);
        assert!(result.findings[0].contains("'shipped', 'ordered'"));
    }

    #[test]
    fn cross_field_rejects_unparseable_checks() {
        let mut registry = RuleRegistry::new();
        register(&mut registry).expect("register");
        let result = registry.get_rule(
            "consistency.cross_field",
            Some(&json!({"checks": ["a >= "]})),
        );
        assert!(matches!(result, Err(RuleError::InvalidParams { .. })));
    }

    #[test]
    fn uniform_representation_flags_minority_spellings() {
        let data = table(
            &["country"],
            &[vec!["PT"], vec!["PT"], vec!["pt"], vec!["BR"]],
        );
        let result = run("consistency.uniform_representation", json!({}), &data);
        assert!((result.score - 7.0 * 0.75).abs() < 1e-9);
        assert!(result.findings[0].contains("'pt'"));
    }

    #[test]
    fn key_uniqueness_counts_duplicates() {
        let data = table(
            &["customer_id", "name"],
            &[vec!["1", "a"], vec!["2", "b"], vec!["2", "c"], vec!["", "d"]],
        );
        let result = run("consistency.key_uniqueness", json!({}), &data);
        assert!((result.score - 6.0 * 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.findings.len(), 2);
    }

    #[test]
    fn uniform_representation_compares_casing_only() {
        let data = table(&["country"], &[vec!["PT"], vec![" PT "], vec!["BR"]]);
        let result = run("consistency.uniform_representation", json!({}), &data);
        assert_eq!(result.score, 7.0);
    }

    #[test]
    fn misconfigured_key_scores_zero() {
        let data = table(&["customer_id"], &[vec!["1"], vec!["2"]]);
        let result = run(
            "consistency.key_uniqueness",
            json!({"columns": ["cust_id"]}),
            &data,
        );
        assert_eq!(result.score, 0.0);
        assert!(result.findings[0].contains("'cust_id'"));

        let absent_text = run(
            "consistency.uniform_representation",
            json!({"columns": ["city"]}),
            &data,
        );
        assert_eq!(absent_text.score, 0.0);
    }

    #[test]
    fn key_uniqueness_without_key_scores_full() {
        let data = table(&["name"], &[vec!["a"], vec!["a"]]);
        let result = run("consistency.key_uniqueness", json!({}), &data);
        assert_eq!(result.score, 6.0);
    }
}
