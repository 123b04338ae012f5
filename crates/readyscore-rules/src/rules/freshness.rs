use chrono::NaiveDateTime;

use readyscore_core::stats::median;
use readyscore_core::{ColumnType, Dataset, Dimension};

use crate::errors::RuleError;
use crate::params::{ParamKind, ParamSpec, RuleParams};
use crate::registry::{RuleRegistry, RuleSpec};
use crate::rule::{Rule, RuleContext, RuleDescriptor, RuleResult};

/// Share of a freshness rule's weight granted when no timestamp column exists.
pub const NO_TIMESTAMP_CREDIT_RATIO: f64 = 0.15;

const DEFAULT_MAX_AGE_DAYS: f64 = 30.0;
const DEFAULT_EXPECTED_INTERVAL_DAYS: f64 = 1.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Name fragments suggesting a column records when a row last changed.
const UPDATE_HINTS: [&str; 4] = ["updated", "modified", "timestamp", "last_"];
/// Name fragments suggesting a column holds dates at all.
const DATE_HINTS: [&str; 6] = ["timestamp", "updated", "modified", "created", "date", "time"];

pub fn register(registry: &mut RuleRegistry) -> Result<(), RuleError> {
    registry.register(RuleSpec {
        descriptor: &TIMESTAMP_RECENCY,
        build: TimestampRecencyRule::build,
    })?;
    registry.register(RuleSpec {
        descriptor: &UPDATE_FREQUENCY,
        build: UpdateFrequencyRule::build,
    })?;
    Ok(())
}

static TIMESTAMP_RECENCY_PARAMS: [ParamSpec; 2] = [
    ParamSpec::optional("column", ParamKind::String),
    ParamSpec::optional("max_age_days", ParamKind::Float),
];

static TIMESTAMP_RECENCY: RuleDescriptor = RuleDescriptor {
    id: "freshness.timestamp_recency",
    dimension: Dimension::Freshness,
    name: "Timestamp recency",
    description: "Scores how recent the newest timestamp is relative to a maximum age.",
    default_weight: 12.0,
    params: &TIMESTAMP_RECENCY_PARAMS,
};

static UPDATE_FREQUENCY_PARAMS: [ParamSpec; 2] = [
    ParamSpec::optional("column", ParamKind::String),
    ParamSpec::optional("expected_interval_days", ParamKind::Float),
];

static UPDATE_FREQUENCY: RuleDescriptor = RuleDescriptor {
    id: "freshness.update_frequency",
    dimension: Dimension::Freshness,
    name: "Update frequency",
    description: "Compares the median gap between distinct timestamps with the expected update interval.",
    default_weight: 8.0,
    params: &UPDATE_FREQUENCY_PARAMS,
};

/// Timestamp column chosen for a freshness rule.
struct TimestampColumn<'d> {
    name: &'d str,
    timestamps: Vec<NaiveDateTime>,
}

/// Locate the timestamp column: explicit name, then date-typed columns (update
/// hints first), then date-named columns whose values parse as dates.
fn discover<'d>(
    dataset: &'d dyn Dataset,
    configured: Option<&str>,
) -> Result<TimestampColumn<'d>, String> {
    if let Some(configured) = configured {
        let Some(name) = dataset.resolve_column(configured) else {
            return Err(format!("configured timestamp column '{configured}' is not present"));
        };
        return with_timestamps(dataset, name)
            .ok_or_else(|| format!("column '{name}' contains no parseable timestamps"));
    }

    let names = dataset.column_names();
    let typed: Vec<&str> = names
        .iter()
        .copied()
        .filter(|name| {
            matches!(
                dataset.column_type(name),
                Some(ColumnType::Date | ColumnType::Timestamp)
            )
        })
        .collect();
    let hinted_typed = typed
        .iter()
        .copied()
        .find(|name| has_hint(name, &UPDATE_HINTS));
    if let Some(found) = hinted_typed
        .into_iter()
        .chain(typed.iter().copied())
        .find_map(|name| with_timestamps(dataset, name))
    {
        return Ok(found);
    }

    names
        .iter()
        .copied()
        .filter(|name| has_hint(name, &DATE_HINTS))
        .find_map(|name| with_timestamps(dataset, name))
        .ok_or_else(|| "no timestamp column found".to_string())
}

fn has_hint(name: &str, hints: &[&str]) -> bool {
    let lowered = name.to_lowercase();
    hints.iter().any(|hint| lowered.contains(hint))
}

fn with_timestamps<'d>(dataset: &'d dyn Dataset, name: &'d str) -> Option<TimestampColumn<'d>> {
    let timestamps: Vec<NaiveDateTime> = dataset
        .values(name)?
        .iter()
        .filter_map(|value| value.as_timestamp())
        .collect();
    if timestamps.is_empty() {
        None
    } else {
        Some(TimestampColumn { name, timestamps })
    }
}

/// Fixed partial credit for datasets without usable timestamps.
fn no_timestamp_result(rule: &dyn Rule, reason: String) -> RuleResult {
    let mut result = rule.result_from_ratio(NO_TIMESTAMP_CREDIT_RATIO);
    result.add_finding(format!("{reason}; freshness cannot be verified"));
    result.add_recommendation("Add a last-updated timestamp column to the source");
    result.set_detail("timestamp_column", serde_json::Value::Null);
    result
}

fn days_between(later: NaiveDateTime, earlier: NaiveDateTime) -> f64 {
    (later - earlier).num_seconds() as f64 / SECONDS_PER_DAY
}

struct TimestampRecencyRule {
    params: RuleParams,
    column: Option<String>,
    max_age_days: f64,
}

impl TimestampRecencyRule {
    fn build(params: RuleParams) -> Result<Box<dyn Rule>, RuleError> {
        let max_age_days =
            params.positive_f64(TIMESTAMP_RECENCY.id, "max_age_days", DEFAULT_MAX_AGE_DAYS)?;
        let column = params.get_str("column").map(str::to_string);
        Ok(Box::new(Self {
            params,
            column,
            max_age_days,
        }))
    }

    /// Score ratio for a newest-record age in days.
    fn recency_ratio(&self, age_days: f64) -> f64 {
        if age_days <= self.max_age_days {
            1.0
        } else {
            (1.0 - (age_days - self.max_age_days) / self.max_age_days).max(0.0)
        }
    }
}

impl Rule for TimestampRecencyRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &TIMESTAMP_RECENCY
    }

    fn params(&self) -> &RuleParams {
        &self.params
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleResult, RuleError> {
        let column = match discover(ctx.dataset, self.column.as_deref()) {
            Ok(column) => column,
            Err(reason) => return Ok(no_timestamp_result(self, reason)),
        };
        let Some(newest) = column.timestamps.iter().max().copied() else {
            return Ok(no_timestamp_result(self, "no timestamps found".to_string()));
        };

        let age_days = days_between(ctx.as_of, newest);
        let mut result = self.result_from_ratio(self.recency_ratio(age_days));
        result.set_detail("timestamp_column", column.name);
        result.set_detail("newest", newest.format("%Y-%m-%dT%H:%M:%S").to_string());
        result.set_detail("age_days", (age_days * 100.0).round() / 100.0);
        result.set_detail("max_age_days", self.max_age_days);

        let future = column
            .timestamps
            .iter()
            .filter(|timestamp| **timestamp > ctx.as_of)
            .count();
        if future > 0 {
            result.add_finding(format!(
                "column '{}' has {future} timestamps after the assessment time",
                column.name
            ));
        }
        if age_days > self.max_age_days {
            result.add_finding(format!(
                "newest record in '{}' is {age_days:.1} days old (maximum {} days)",
                column.name, self.max_age_days
            ));
            result.add_recommendation("Refresh the dataset from its source");
        }
        Ok(result)
    }
}

struct UpdateFrequencyRule {
    params: RuleParams,
    column: Option<String>,
    expected_interval_days: f64,
}

impl UpdateFrequencyRule {
    fn build(params: RuleParams) -> Result<Box<dyn Rule>, RuleError> {
        let expected_interval_days = params.positive_f64(
            UPDATE_FREQUENCY.id,
            "expected_interval_days",
            DEFAULT_EXPECTED_INTERVAL_DAYS,
        )?;
        let column = params.get_str("column").map(str::to_string);
        Ok(Box::new(Self {
            params,
            column,
            expected_interval_days,
        }))
    }
}

impl Rule for UpdateFrequencyRule {
    fn descriptor(&self) -> &'static RuleDescriptor {
        &UPDATE_FREQUENCY
    }

    fn params(&self) -> &RuleParams {
        &self.params
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleResult, RuleError> {
        let column = match discover(ctx.dataset, self.column.as_deref()) {
            Ok(column) => column,
            Err(reason) => return Ok(no_timestamp_result(self, reason)),
        };

        let mut distinct = column.timestamps.clone();
        distinct.sort();
        distinct.dedup();

        if distinct.len() < 2 {
            let mut result = self.result_from_ratio(0.5);
            result.set_detail("timestamp_column", column.name);
            result.add_finding(format!(
                "column '{}' has a single distinct timestamp; update frequency is unknown",
                column.name
            ));
            return Ok(result);
        }

        let gaps: Vec<f64> = distinct
            .windows(2)
            .map(|pair| days_between(pair[1], pair[0]))
            .collect();
        let Some(median_gap) = median(&gaps) else {
            return Err(RuleError::evaluation(
                UPDATE_FREQUENCY.id,
                "could not compute timestamp gaps",
            ));
        };

        let ratio = (self.expected_interval_days / median_gap).min(1.0);
        let mut result = self.result_from_ratio(ratio);
        result.set_detail("timestamp_column", column.name);
        result.set_detail("median_gap_days", (median_gap * 1000.0).round() / 1000.0);
        result.set_detail("expected_interval_days", self.expected_interval_days);
        result.set_detail("distinct_timestamps", distinct.len());
        if median_gap > self.expected_interval_days {
            result.add_finding(format!(
                "records in '{}' are updated every {median_gap:.1} days on median (expected every {} days)",
                column.name, self.expected_interval_days
            ));
            result.add_recommendation("Increase the update cadence of the source feed");
        }
        Ok(result)
    }
}
