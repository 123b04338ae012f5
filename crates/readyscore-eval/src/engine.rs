use chrono::Utc;
use tracing::info;

use readyscore_core::{CoreError, Dataset};
use readyscore_rules::{RuleContext, RuleRegistry};

use crate::config::{AssessmentConfig, PreparedConfig};
use crate::dimension::evaluate_rules;
use crate::errors::EvalError;
use crate::report::{AssessmentReport, SourceInfo};
use crate::template::{Template, assess_with_templates};

/// Runs all five dimensions over a dataset and assembles the report.
pub struct AssessmentEngine<'r> {
    registry: &'r RuleRegistry,
}

impl AssessmentEngine<'static> {
    /// Engine backed by the process-wide registry of built-in rules.
    pub fn with_builtin_rules() -> Result<Self, EvalError> {
        Ok(Self::new(RuleRegistry::global()?))
    }
}

impl<'r> AssessmentEngine<'r> {
    pub fn new(registry: &'r RuleRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r RuleRegistry {
        self.registry
    }

    /// Assess a dataset. Rule faults become findings; only configuration and
    /// structural problems are returned as errors.
    pub fn assess(
        &self,
        dataset: &dyn Dataset,
        config: &AssessmentConfig,
    ) -> Result<AssessmentReport, EvalError> {
        let prepared = config.prepare(self.registry)?;
        self.assess_prepared(dataset, &prepared)
    }

    /// Assess with an already prepared configuration.
    pub fn assess_prepared(
        &self,
        dataset: &dyn Dataset,
        prepared: &PreparedConfig,
    ) -> Result<AssessmentReport, EvalError> {
        if dataset.column_count() == 0 {
            return Err(CoreError::InvalidDataset(format!(
                "dataset '{}' has no columns",
                dataset.name()
            ))
            .into());
        }

        let assessment_time = Utc::now();
        let as_of = prepared
            .as_of()
            .unwrap_or_else(|| assessment_time.naive_utc());
        info!(
            event = "assessment_started",
            source = %dataset.name(),
            records = dataset.row_count(),
            columns = dataset.column_count(),
            as_of = %as_of
        );

        let ctx = RuleContext::new(dataset, as_of);
        let mut results = Vec::with_capacity(prepared.dimensions().len());
        for dimension in prepared.dimensions() {
            let result = evaluate_rules(dimension.dimension, &dimension.rules, &ctx);
            info!(
                event = "dimension_evaluated",
                dimension = %dimension.dimension,
                score = result.score,
                findings = result.findings.len()
            );
            results.push(result);
        }

        let report = AssessmentReport::new(
            SourceInfo::from_dataset(dataset),
            assessment_time,
            as_of,
            results,
            prepared.weights(),
        );
        info!(
            event = "assessment_finished",
            assessment_id = %report.assessment_id(),
            overall_score = report.overall_score(),
            readiness_level = %report.readiness_level()
        );
        Ok(report)
    }

    /// Assess a dataset and attach one evaluation per template.
    pub fn assess_with_templates(
        &self,
        dataset: &dyn Dataset,
        config: &AssessmentConfig,
        templates: &[Template],
    ) -> Result<AssessmentReport, EvalError> {
        let mut report = self.assess(dataset, config)?;
        for evaluation in assess_with_templates(&report, templates) {
            report.attach_template_evaluation(evaluation);
        }
        Ok(report)
    }
}
