use serde_json::json;

use readyscore_core::{Dataset, Dimension};

use crate::errors::RuleError;
use crate::params::{ParamKind, ParamSpec, RuleParams};
use crate::registry::{RuleRegistry, RuleSpec};
use crate::rule::{Rule, RuleContext, RuleDescriptor, RuleResult};
use crate::rules::{DEFAULT_MAX_EXAMPLES, percent, quoted_list, ratio, resolve_columns};

pub fn register(registry: &mut RuleRegistry) -> Result<(), RuleError> {
    registry.register(RuleSpec {
        descriptor: &REQUIRED_FIELDS,
        build: RequiredFieldsRule::build,
    })?;
    registry.register(RuleSpec {
        descriptor: &POPULATION_DENSITY,
        build: PopulationDensityRule::build,
    })?;
    Ok(())
}

static REQUIRED_FIELDS_PARAMS: [ParamSpec; 2] = [
    ParamSpec::optional("fields", ParamKind::StringList),
    ParamSpec::optional("max_examples", ParamKind::Int),
];

static REQUIRED_FIELDS: RuleDescriptor = RuleDescriptor {
    id: "completeness.required_fields",
    dimension: Dimension::Completeness,
    name: "Required fields",
    description: "Checks that required columns exist and are populated.",
    default_weight: 10.0,
    params: &REQUIRED_FIELDS_PARAMS,
};

static POPULATION_DENSITY_PARAMS: [ParamSpec; 2] = [
    ParamSpec::optional("columns", ParamKind::StringList),
    ParamSpec::optional("min_column_ratio", ParamKind::Float),
];

static POPULATION_DENSITY: RuleDescriptor = RuleDescriptor {
    id: "completeness.population_density",
    dimension: Dimension::Completeness,
    name: "Population density",
    description: "Measures the share of populated cells, excluding cells marked not applicable.",
    default_weight: 10.0,
    params: &POPULATION_DENSITY_PARAMS,
};

const DEFAULT_MIN_COLUMN_RATIO: f64 = 0.95;

/// Cell counts of one column. Not-applicable cells are neither present nor missing.
struct ColumnFill {
    present: usize,
    missing: usize,
}

impl ColumnFill {
    fn of(dataset: &dyn Dataset, column: &str) -> ColumnFill {
        let mut fill = ColumnFill {
            present: 0,
            missing: 0,
        };
        for value in dataset.values(column).unwrap_or_default() {
            if value.is_present() {
                fill.present += 1;
            } else if value.is_null() {
                fill.missing += 1;
            }
        }
        fill
    }

    fn applicable(&self) -> usize {
        self.present + self.missing
    }
}

struct RequiredFieldsRule {
    params: RuleParams,
    fields: Option<Vec<String>>,
    max_examples: usize,
}

impl RequiredFieldsRule {
    fn build(params: RuleParams) -> Result<Box<dyn Rule>, RuleError> {
        let fields = params.get_string_list("fields");
        let max_examples = params
            .get_usize("max_examples")
            .unwrap_or(DEFAULT_MAX_EXAMPLES);
        Ok(Box::new(Self {
            params,
            fields,
            max_examples,
        }))
    }
}

impl Rule for RequiredFieldsRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &REQUIRED_FIELDS
    }

    fn params(&self) -> &RuleParams {
        &self.params
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleResult, RuleError> {
        let dataset = ctx.dataset;
        let columns: Vec<&str> = match &self.fields {
            Some(fields) => {
                let (found, absent) = resolve_columns(dataset, fields);
                if !absent.is_empty() {
                    let mut result = self.result_from_ratio(0.0);
                    result.add_finding(format!(
                        "missing required columns: {}",
                        quoted_list(&absent)
                    ));
                    result.add_recommendation(format!(
                        "Add the required columns {} to the source",
                        quoted_list(&absent)
                    ));
                    result.set_detail("missing_columns", absent);
                    return Ok(result);
                }
                found
            }
            None => dataset.column_names(),
        };

        let mut result = self.result_from_ratio(1.0);
        if columns.is_empty() {
            result.add_finding("no required fields to check");
            return Ok(result);
        }

        let mut present = 0usize;
        let mut applicable = 0usize;
        let mut sparse = Vec::new();
        for column in &columns {
            let fill = ColumnFill::of(dataset, column);
            present += fill.present;
            applicable += fill.applicable();
            if fill.missing > 0 {
                result.add_finding(format!(
                    "required column '{column}' has {} missing of {} values",
                    fill.missing,
                    fill.applicable()
                ));
                sparse.push(column.to_string());
            }
        }

        let mut incomplete_rows = Vec::new();
        if !sparse.is_empty() {
            for row in 0..dataset.row_count() {
                if incomplete_rows.len() >= self.max_examples {
                    break;
                }
                let row_missing = sparse.iter().any(|column| {
                    dataset
                        .values(column)
                        .and_then(|values| values.get(row))
                        .is_some_and(|value| value.is_null())
                });
                if row_missing {
                    incomplete_rows.push(row + 1);
                }
            }
            result.add_recommendation(format!(
                "Populate or backfill {} before use",
                quoted_list(&sparse)
            ));
            result.set_detail("incomplete_rows", incomplete_rows);
        }

        result.set_ratio(ratio(present, applicable));
        result.set_detail("checked_columns", columns.len());
        result.set_detail("missing_cells", applicable - present);
        Ok(result)
    }
}

struct PopulationDensityRule {
    params: RuleParams,
    columns: Option<Vec<String>>,
    min_column_ratio: f64,
}

impl PopulationDensityRule {
    fn build(params: RuleParams) -> Result<Box<dyn Rule>, RuleError> {
        let min_column_ratio = params
            .get_f64("min_column_ratio")
            .unwrap_or(DEFAULT_MIN_COLUMN_RATIO);
        if !(0.0..=1.0).contains(&min_column_ratio) {
            return Err(RuleError::invalid_params(
                POPULATION_DENSITY.id,
                "min_column_ratio must be between 0 and 1",
            ));
        }
        let columns = params.get_string_list("columns");
        Ok(Box::new(Self {
            params,
            columns,
            min_column_ratio,
        }))
    }
}

impl Rule for PopulationDensityRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &POPULATION_DENSITY
    }

    fn params(&self) -> &RuleParams {
        &self.params
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleResult, RuleError> {
        let dataset = ctx.dataset;
        let mut result = self.result_from_ratio(1.0);
        let columns = match &self.columns {
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
            None => dataset.column_names(),
        };

        let mut present = 0usize;
        let mut applicable = 0usize;
        let mut not_applicable = 0usize;
        let mut sparse = Vec::new();
        for column in &columns {
            let fill = ColumnFill::of(dataset, column);
            present += fill.present;
            applicable += fill.applicable();
            not_applicable += dataset.row_count().saturating_sub(fill.applicable());
            let column_ratio = ratio(fill.present, fill.applicable());
            if column_ratio < self.min_column_ratio {
                sparse.push(json!({
                    "column": column,
                    "populated": percent(fill.present, fill.applicable()),
                }));
                result.add_finding(format!(
                    "column '{column}' is only {} populated (threshold {:.0}%)",
                    percent(fill.present, fill.applicable()),
                    self.min_column_ratio * 100.0
                ));
            }
        }

        if applicable == 0 {
            result.add_finding("no applicable cells to check");
            return Ok(result);
        }

        result.set_ratio(ratio(present, applicable));
        result.set_detail("populated_cells", present);
        result.set_detail("applicable_cells", applicable);
        result.set_detail("not_applicable_cells", not_applicable);
        result.set_detail("overall_density", percent(present, applicable));
        if !sparse.is_empty() {
            result.add_recommendation(
                "Investigate the collection process of sparsely populated columns",
            );
            result.set_detail("sparse_columns", sparse);
        }
        Ok(result)
    }
}
