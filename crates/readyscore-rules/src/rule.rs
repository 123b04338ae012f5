use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use readyscore_core::{Dataset, Dimension};

use crate::errors::RuleError;
use crate::params::{ParamSpec, RuleParams};

/// Static metadata of a rule implementation.
#[derive(Debug)]
pub struct RuleDescriptor {
    /// Stable identifier, `dimension.rule_name`.
    pub id: &'static str,
    pub dimension: Dimension,
    pub name: &'static str,
    pub description: &'static str,
    pub default_weight: f64,
    pub params: &'static [ParamSpec],
}

impl RuleDescriptor {
    /// Rule name without the dimension prefix.
    pub fn short_name(&self) -> &'static str {
        self.id
            .split_once('.')
            .map(|(_, name)| name)
            .unwrap_or(self.id)
    }
}

/// Inputs shared by every rule of one assessment.
#[derive(Clone, Copy)]
pub struct RuleContext<'a> {
    pub dataset: &'a dyn Dataset,
    /// Reference time for age computations.
    pub as_of: NaiveDateTime,
}

impl<'a> RuleContext<'a> {
    pub fn new(dataset: &'a dyn Dataset, as_of: NaiveDateTime) -> Self {
        Self { dataset, as_of }
    }
}

/// Outcome of one rule run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleResult {
    pub rule_id: String,
    /// Achieved score, always within `[0, max_score]`.
    pub score: f64,
    pub max_score: f64,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl RuleResult {
    /// Empty result scoring zero.
    pub fn new(rule_id: impl Into<String>, max_score: f64) -> Self {
        Self {
            rule_id: rule_id.into(),
            score: 0.0,
            max_score: clamp_score(max_score, f64::MAX),
            findings: Vec::new(),
            recommendations: Vec::new(),
            details: BTreeMap::new(),
        }
    }

    /// Result scoring `ratio * max_score`, with the ratio clamped to `[0, 1]`.
    pub fn from_ratio(rule_id: impl Into<String>, max_score: f64, ratio: f64) -> Self {
        let mut result = Self::new(rule_id, max_score);
        result.set_ratio(ratio);
        result
    }

    pub fn set_score(&mut self, score: f64) {
        self.score = clamp_score(score, self.max_score);
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        let ratio = if ratio.is_nan() {
            0.0
        } else {
            ratio.clamp(0.0, 1.0)
        };
        self.set_score(ratio * self.max_score);
    }

    /// Fraction of the maximum achieved; 1.0 for zero-weight rules.
    pub fn ratio(&self) -> f64 {
        if self.max_score > 0.0 {
            self.score / self.max_score
        } else {
            1.0
        }
    }

    pub fn add_finding(&mut self, finding: impl Into<String>) {
        self.findings.push(finding.into());
    }

    pub fn add_recommendation(&mut self, recommendation: impl Into<String>) {
        self.recommendations.push(recommendation.into());
    }

    pub fn set_detail(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.details.insert(key.to_string(), value.into());
    }
}

fn clamp_score(score: f64, max: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, max.max(0.0))
}

/// A single configurable check contributing a bounded sub-score to one dimension.
pub trait Rule: Send + Sync {
    fn descriptor(&self) -> &'static RuleDescriptor;

    /// Resolved parameters of this instance.
    fn params(&self) -> &RuleParams;

    /// Inspect the dataset. Bad data is reported as findings; an error means the
    /// rule itself could not run.
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Result<RuleResult, RuleError>;

    fn id(&self) -> &'static str {
        self.descriptor().id
    }

    fn dimension(&self) -> Dimension {
        self.descriptor().dimension
    }

    fn name(&self) -> &'static str {
        self.descriptor().name
    }

    fn description(&self) -> &'static str {
        self.descriptor().description
    }

    fn weight(&self) -> f64 {
        self.params().weight()
    }

    fn enabled(&self) -> bool {
        self.params().enabled()
    }

    /// Start a result for this rule scoring `ratio` of its weight.
    fn result_from_ratio(&self, ratio: f64) -> RuleResult {
        RuleResult::from_ratio(self.id(), self.weight(), ratio)
    }

    /// Short human-readable explanation of a result.
    fn generate_narrative(&self, result: &RuleResult) -> String {
        let percent = result.ratio() * 100.0;
        let mut text = format!(
            "{} scored {:.1} of {:.1} ({percent:.0}%).",
            self.name(),
            result.score,
            result.max_score
        );
        match result.findings.as_slice() {
            [] => text.push_str(" No issues were found."),
            [only] => {
                text.push_str(" Finding: ");
                text.push_str(only);
                text.push('.');
            }
            [first, rest @ ..] => {
                text.push_str(&format!(
                    " Main finding: {first} ({} more).",
                    rest.len()
                ));
            }
        }
        if let Some(recommendation) = result.recommendations.first() {
            text.push_str(" Recommended action: ");
            text.push_str(recommendation);
            text.push('.');
        }
        text
    }
}
