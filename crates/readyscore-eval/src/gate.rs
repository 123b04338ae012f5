use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use readyscore_core::Dimension;

use crate::report::AssessmentReport;

/// Minimum scores a report must reach, e.g. to fail a CI job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreGate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_overall: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dimension_minimums: BTreeMap<Dimension, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateFailure {
    /// `overall` or a dimension name.
    pub target: String,
    pub required: f64,
    pub actual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateOutcome {
    pub passed: bool,
    pub failures: Vec<GateFailure>,
}

impl ScoreGate {
    pub fn with_min_overall(min_overall: f64) -> Self {
        Self {
            min_overall: Some(min_overall),
            ..Self::default()
        }
    }

    pub fn require_dimension(mut self, dimension: Dimension, minimum: f64) -> Self {
        self.dimension_minimums.insert(dimension, minimum);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.min_overall.is_none() && self.dimension_minimums.is_empty()
    }

    pub fn check(&self, report: &AssessmentReport) -> GateOutcome {
        let mut failures = Vec::new();
        if let Some(required) = self.min_overall
            && report.overall_score() < required
        {
            failures.push(GateFailure {
                target: "overall".to_string(),
                required,
                actual: report.overall_score(),
            });
        }
        for (dimension, required) in &self.dimension_minimums {
            let actual = report.dimension_score(*dimension);
            if actual < *required {
                failures.push(GateFailure {
                    target: dimension.as_str().to_string(),
                    required: *required,
                    actual,
                });
            }
        }
        GateOutcome {
            passed: failures.is_empty(),
            failures,
        }
    }
}
