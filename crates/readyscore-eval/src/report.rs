use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use readyscore_core::{Dataset, Dimension, MAX_DIMENSION_SCORE, MAX_OVERALL_SCORE};

use crate::dimension::DimensionResult;
use crate::errors::EvalError;
use crate::readiness::ReadinessLevel;
use crate::template::TemplateEvaluation;

/// Version of the serialized report layout.
pub const REPORT_VERSION: &str = "1.0";

/// Identity and shape of the assessed source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    pub name: String,
    pub source_type: String,
    pub record_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
}

impl SourceInfo {
    pub fn from_dataset(dataset: &dyn Dataset) -> Self {
        let columns: Vec<String> = dataset
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        Self {
            name: dataset.name().to_string(),
            source_type: dataset.source_type().to_string(),
            record_count: dataset.row_count(),
            column_count: columns.len(),
            columns,
        }
    }
}

/// Result of one assessment.
///
/// Scores are fixed at construction; template evaluations can only be attached.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentReport {
    assessment_id: Uuid,
    report_version: String,
    source: SourceInfo,
    assessment_time: DateTime<Utc>,
    as_of: NaiveDateTime,
    overall_score: f64,
    readiness_level: ReadinessLevel,
    dimension_results: BTreeMap<Dimension, DimensionResult>,
    dimension_weights: BTreeMap<Dimension, f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    template_evaluations: Vec<TemplateEvaluation>,
}

impl AssessmentReport {
    /// Build a report from dimension results; missing weights default to 1.0.
    pub fn new(
        source: SourceInfo,
        assessment_time: DateTime<Utc>,
        as_of: NaiveDateTime,
        results: Vec<DimensionResult>,
        weights: BTreeMap<Dimension, f64>,
    ) -> Self {
        let dimension_results: BTreeMap<Dimension, DimensionResult> = results
            .into_iter()
            .map(|result| (result.dimension, result))
            .collect();
        let dimension_weights: BTreeMap<Dimension, f64> = Dimension::ALL
            .iter()
            .map(|dimension| (*dimension, weights.get(dimension).copied().unwrap_or(1.0)))
            .collect();
        let overall_score = overall_score(&dimension_results, &dimension_weights);
        Self {
            assessment_id: Uuid::new_v4(),
            report_version: REPORT_VERSION.to_string(),
            source,
            assessment_time,
            as_of,
            overall_score,
            readiness_level: ReadinessLevel::from_score(overall_score),
            dimension_results,
            dimension_weights,
            template_evaluations: Vec::new(),
        }
    }

    pub fn assessment_id(&self) -> Uuid {
        self.assessment_id
    }

    pub fn report_version(&self) -> &str {
        &self.report_version
    }

    pub fn source(&self) -> &SourceInfo {
        &self.source
    }

    pub fn assessment_time(&self) -> DateTime<Utc> {
        self.assessment_time
    }

    /// Reference time used by freshness rules.
    pub fn as_of(&self) -> NaiveDateTime {
        self.as_of
    }

    /// Overall score in `[0, 100]`, rounded to two decimals.
    pub fn overall_score(&self) -> f64 {
        self.overall_score
    }

    pub fn readiness_level(&self) -> ReadinessLevel {
        self.readiness_level
    }

    /// Dimension results in the fixed dimension order.
    pub fn dimension_results(&self) -> &BTreeMap<Dimension, DimensionResult> {
        &self.dimension_results
    }

    pub fn dimension_result(&self, dimension: Dimension) -> Option<&DimensionResult> {
        self.dimension_results.get(&dimension)
    }

    /// Score of a dimension, 0 when it was not assessed.
    pub fn dimension_score(&self, dimension: Dimension) -> f64 {
        self.dimension_result(dimension)
            .map(|result| result.score)
            .unwrap_or(0.0)
    }

    pub fn dimension_weights(&self) -> &BTreeMap<Dimension, f64> {
        &self.dimension_weights
    }

    pub fn template_evaluations(&self) -> &[TemplateEvaluation] {
        &self.template_evaluations
    }

    pub fn attach_template_evaluation(&mut self, evaluation: TemplateEvaluation) {
        self.template_evaluations.push(evaluation);
    }

    pub fn to_json_pretty(&self) -> Result<String, EvalError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), EvalError> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}

/// Weighted average of the 0-20 dimension scores rescaled to 0-100.
pub fn overall_score(
    results: &BTreeMap<Dimension, DimensionResult>,
    weights: &BTreeMap<Dimension, f64>,
) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for dimension in Dimension::ALL {
        let weight = weights.get(&dimension).copied().unwrap_or(1.0);
        let score = results
            .get(&dimension)
            .map(|result| result.score)
            .unwrap_or(0.0);
        weighted += score * weight;
        total_weight += weight;
    }
    if total_weight <= 0.0 {
        return 0.0;
    }
    let scale = MAX_OVERALL_SCORE / MAX_DIMENSION_SCORE;
    let score = (weighted / total_weight * scale).clamp(0.0, MAX_OVERALL_SCORE);
    (score * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::DimensionResult;

    fn result(dimension: Dimension, score: f64) -> DimensionResult {
        DimensionResult::with_score(dimension, score)
    }

    fn results(scores: [f64; 5]) -> BTreeMap<Dimension, DimensionResult> {
        Dimension::ALL
            .iter()
            .zip(scores)
            .map(|(dimension, score)| (*dimension, result(*dimension, score)))
            .collect()
    }

    #[test]
    fn overall_is_sum_with_equal_weights() {
        let scores = results([20.0, 15.0, 3.0, 14.0, 18.5]);
        assert_eq!(overall_score(&scores, &BTreeMap::new()), 70.5);
    }

    #[test]
    fn overall_honours_dimension_weights() {
        let scores = results([20.0, 10.0, 10.0, 10.0, 10.0]);
        let mut weights = BTreeMap::new();
        weights.insert(Dimension::Validity, 5.0);
        // (20*5 + 10*4) / 9 * 5
        assert_eq!(overall_score(&scores, &weights), 77.78);
    }

    #[test]
    fn report_serializes_dimensions_in_fixed_order() {
        let report = AssessmentReport::new(
            SourceInfo {
                name: "orders".to_string(),
                source_type: "csv".to_string(),
                record_count: 3,
                column_count: 1,
                columns: vec!["id".to_string()],
            },
            Utc::now(),
            Utc::now().naive_utc(),
            results([10.0, 10.0, 10.0, 10.0, 10.0]).into_values().rev().collect(),
            BTreeMap::new(),
        );
        assert_eq!(report.overall_score(), 50.0);
        assert_eq!(report.readiness_level(), ReadinessLevel::Basic);
        let json = report.to_json_pretty().expect("json");
        let positions: Vec<usize> = Dimension::ALL
            .iter()
            .map(|dimension| json.find(&format!("\"{}\": {{", dimension.as_str())).expect("key"))
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
