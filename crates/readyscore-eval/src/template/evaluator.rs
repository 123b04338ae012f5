use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use readyscore_core::{Dimension, Scope, Value, parse_expression};

use crate::dimension::RuleStatus;
use crate::report::AssessmentReport;
use crate::template::matching::{ColumnMatcher, FieldMatch};
use crate::template::model::{CustomRule, GapSeverity, Template};

/// Kind of template requirement a gap refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementKind {
    OverallMinimum,
    DimensionMinimum,
    RequiredRule,
    MandatoryField,
    CustomRule,
}

/// One unmet requirement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gap {
    pub requirement: RequirementKind,
    pub requirement_description: String,
    pub expected_value: serde_json::Value,
    pub actual_value: serde_json::Value,
    pub severity: GapSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<Dimension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificationBadge {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    pub template_id: String,
    pub template_version: String,
    pub standards: Vec<String>,
    pub issued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

/// Coarse estimate of the work needed to close all gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationEffort {
    None,
    Minimal,
    Moderate,
    Significant,
    Extensive,
}

impl RemediationEffort {
    pub fn from_points(points: u32) -> Self {
        match points {
            0 => RemediationEffort::None,
            1..=3 => RemediationEffort::Minimal,
            4..=10 => RemediationEffort::Moderate,
            11..=20 => RemediationEffort::Significant,
            _ => RemediationEffort::Extensive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationEffort::None => "none",
            RemediationEffort::Minimal => "minimal",
            RemediationEffort::Moderate => "moderate",
            RemediationEffort::Significant => "significant",
            RemediationEffort::Extensive => "extensive",
        }
    }
}

/// Outcome of checking one report against one template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateEvaluation {
    pub template_id: String,
    pub template_version: String,
    pub template_name: String,
    pub compliant: bool,
    /// Percentage of individual requirements met.
    pub compliance_score: f64,
    pub requirements_total: usize,
    pub requirements_met: usize,
    /// Unmet requirements, most severe first.
    pub gaps: Vec<Gap>,
    pub certification_eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certification: Option<CertificationBadge>,
    pub remediation_effort: RemediationEffort,
    pub remediation_points: u32,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_matches: Vec<FieldMatch>,
}

impl TemplateEvaluation {
    pub fn gaps_with_severity(&self, severity: GapSeverity) -> impl Iterator<Item = &Gap> {
        self.gaps.iter().filter(move |gap| gap.severity == severity)
    }

    pub fn has_blocking_gaps(&self) -> bool {
        self.gaps_with_severity(GapSeverity::Blocking).next().is_some()
    }
}

/// Checks reports against a template; evaluation never mutates the report.
pub struct TemplateEvaluator<'t> {
    template: &'t Template,
    matcher: ColumnMatcher,
}

struct Tally {
    total: usize,
    met: usize,
    gaps: Vec<Gap>,
    field_matches: Vec<FieldMatch>,
}

impl Tally {
    fn record(&mut self, gap: Option<Gap>) {
        self.total += 1;
        match gap {
            Some(gap) => self.gaps.push(gap),
            None => self.met += 1,
        }
    }
}

impl<'t> TemplateEvaluator<'t> {
    pub fn new(template: &'t Template) -> Self {
        Self {
            template,
            matcher: ColumnMatcher::new(template.pattern_matching.as_ref()),
        }
    }

    pub fn evaluate(&self, report: &AssessmentReport) -> TemplateEvaluation {
        let template = self.template;
        let mut tally = Tally {
            total: 0,
            met: 0,
            gaps: Vec::new(),
            field_matches: Vec::new(),
        };

        tally.record(self.check_overall(report));
        for dimension in Dimension::ALL {
            if let Some(minimum) = template.requirements.dimension_minimum(dimension) {
                tally.record(self.check_dimension(report, dimension, minimum));
            }
        }
        for (dimension, rule_id) in template.requirements.required_rule_ids() {
            tally.record(self.check_required_rule(report, dimension, &rule_id));
        }
        for field in &template.requirements.mandatory_fields {
            match self.matcher.best_match(field, &report.source().columns) {
                Some(found) => {
                    tally.field_matches.push(found);
                    tally.record(None);
                }
                None => tally.record(Some(self.missing_field_gap(report, field))),
            }
        }
        for rule in &template.requirements.custom_rules {
            tally.record(self.check_custom_rule(report, rule));
        }

        let Tally {
            total,
            met,
            mut gaps,
            field_matches,
        } = tally;
        gaps.sort_by(|left, right| right.severity.cmp(&left.severity));

        let compliant = !gaps.iter().any(|gap| gap.severity >= GapSeverity::Medium);
        let compliance_score = if total == 0 {
            100.0
        } else {
            round2(met as f64 / total as f64 * 100.0)
        };
        let certification_eligible = self.certification_eligible(report, compliant, &gaps);
        let certification = if certification_eligible {
            self.badge(report)
        } else {
            None
        };
        let remediation_points: u32 = gaps.iter().map(|gap| gap.severity.effort_points()).sum();
        let mut recommendations: Vec<String> = Vec::new();
        for remediation in gaps.iter().filter_map(|gap| gap.remediation.as_ref()) {
            if !recommendations.contains(remediation) {
                recommendations.push(remediation.clone());
            }
        }

        info!(
            event = "template_evaluated",
            template = %template.template.id,
            compliant,
            compliance_score,
            gaps = gaps.len(),
            certification_eligible
        );

        TemplateEvaluation {
            template_id: template.template.id.clone(),
            template_version: template.template.version.clone(),
            template_name: template.template.name.clone(),
            compliant,
            compliance_score,
            requirements_total: total,
            requirements_met: met,
            gaps,
            certification_eligible,
            certification,
            remediation_effort: RemediationEffort::from_points(remediation_points),
            remediation_points,
            recommendations,
            field_matches,
        }
    }

    fn check_overall(&self, report: &AssessmentReport) -> Option<Gap> {
        let minimum = self.template.requirements.overall_minimum;
        let actual = report.overall_score();
        if actual >= minimum {
            return None;
        }
        Some(Gap {
            requirement: RequirementKind::OverallMinimum,
            requirement_description: format!("Overall score must be at least {minimum}"),
            expected_value: json!(minimum),
            actual_value: json!(actual),
            severity: GapSeverity::Blocking,
            dimension: None,
            remediation: Some(format!(
                "Raise the overall score from {} to at least {minimum} by improving the lowest-scoring dimensions",
                round2(actual)
            )),
        })
    }

    fn check_dimension(
        &self,
        report: &AssessmentReport,
        dimension: Dimension,
        minimum: f64,
    ) -> Option<Gap> {
        let actual = report.dimension_score(dimension);
        if actual >= minimum {
            return None;
        }
        let severity = if actual < minimum * 0.5 {
            GapSeverity::High
        } else {
            GapSeverity::Medium
        };
        let advice = report
            .dimension_result(dimension)
            .and_then(|result| result.recommendations.first().cloned())
            .unwrap_or_else(|| dimension.question().to_string());
        let description = self
            .template
            .requirements
            .dimension_requirements
            .get(&dimension)
            .and_then(|requirement| requirement.description())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "{} score must be at least {minimum}",
                    capitalize(dimension.as_str())
                )
            });
        Some(Gap {
            requirement: RequirementKind::DimensionMinimum,
            requirement_description: description,
            expected_value: json!(minimum),
            actual_value: json!(round2(actual)),
            severity,
            dimension: Some(dimension),
            remediation: Some(format!("Raise {dimension} to at least {minimum}: {advice}")),
        })
    }

    fn check_required_rule(
        &self,
        report: &AssessmentReport,
        dimension: Option<Dimension>,
        rule_id: &str,
    ) -> Option<Gap> {
        let status = dimension
            .and_then(|dimension| report.dimension_result(dimension))
            .and_then(|result| result.outcome(rule_id))
            .map(|outcome| outcome.status);
        let actual = match status {
            Some(RuleStatus::Evaluated) => return None,
            Some(RuleStatus::Disabled) => "disabled",
            Some(RuleStatus::Failed) => "failed",
            None => "not configured",
        };
        Some(Gap {
            requirement: RequirementKind::RequiredRule,
            requirement_description: format!("Rule '{rule_id}' must be evaluated"),
            expected_value: json!("evaluated"),
            actual_value: json!(actual),
            severity: GapSeverity::Blocking,
            dimension,
            remediation: Some(format!(
                "Enable rule '{rule_id}' in the assessment configuration and make sure it runs"
            )),
        })
    }

    fn missing_field_gap(&self, report: &AssessmentReport, field: &str) -> Gap {
        let closest = report
            .source()
            .columns
            .iter()
            .map(|column| self.matcher.score(field, column))
            .fold(None::<FieldMatch>, |best, candidate| match best {
                Some(best) if best.confidence >= candidate.confidence => Some(best),
                _ => Some(candidate),
            });
        Gap {
            requirement: RequirementKind::MandatoryField,
            requirement_description: format!("Mandatory field '{field}' must be present"),
            expected_value: json!(field),
            actual_value: closest
                .map(|found| json!({"closest_column": found.column, "confidence": found.confidence}))
                .unwrap_or(serde_json::Value::Null),
            severity: GapSeverity::High,
            dimension: Some(Dimension::Completeness),
            remediation: Some(format!(
                "Add a column for '{field}' or declare its name under pattern_matching"
            )),
        }
    }

    fn check_custom_rule(&self, report: &AssessmentReport, rule: &CustomRule) -> Option<Gap> {
        let outcome = parse_expression(&rule.expression)
            .and_then(|expr| expr.evaluate_predicate(&ReportScope { report }));
        let actual = match outcome {
            Ok(Some(true)) => return None,
            Ok(Some(false)) => json!(false),
            Ok(None) => serde_json::Value::Null,
            Err(err) => json!({"error": err.to_string()}),
        };
        let description = rule
            .description
            .clone()
            .unwrap_or_else(|| {
                format!("Custom rule '{}' must hold: {}", rule.name, rule.expression)
            });
        Some(Gap {
            requirement: RequirementKind::CustomRule,
            requirement_description: description,
            expected_value: json!(true),
            actual_value: actual,
            severity: rule.severity.unwrap_or(GapSeverity::Medium),
            dimension: None,
            remediation: Some(
                rule.remediation
                    .clone()
                    .unwrap_or_else(|| format!("Satisfy custom rule '{}'", rule.name)),
            ),
        })
    }

    /// Compliant, no blocking or high gaps, and the certification block's
    /// score conditions met. Declared standards do not take part.
    fn certification_eligible(
        &self,
        report: &AssessmentReport,
        compliant: bool,
        gaps: &[Gap],
    ) -> bool {
        let blocking_or_high = gaps.iter().any(|gap| gap.severity >= GapSeverity::High);
        if !compliant || blocking_or_high {
            return false;
        }
        let Some(certification) = &self.template.certification else {
            return true;
        };
        if let Some(minimum) = certification.minimum_score
            && report.overall_score() < minimum
        {
            return false;
        }
        if let Some(floor) = certification.dimension_floor
            && Dimension::ALL
                .iter()
                .any(|dimension| report.dimension_score(*dimension) < floor)
        {
            return false;
        }
        true
    }

    fn badge(&self, report: &AssessmentReport) -> Option<CertificationBadge> {
        let certification = self.template.certification.as_ref()?;
        let issued_at = report.assessment_time();
        Some(CertificationBadge {
            level: certification.level.clone(),
            badge: certification.badge.clone(),
            template_id: self.template.template.id.clone(),
            template_version: self.template.template.version.clone(),
            standards: certification.standards.clone(),
            issued_at,
            valid_until: certification
                .validity_period_days
                .map(|days| issued_at + Duration::days(i64::from(days))),
        })
    }
}

/// Evaluate a report against a single template.
pub fn evaluate_template(report: &AssessmentReport, template: &Template) -> TemplateEvaluation {
    TemplateEvaluator::new(template).evaluate(report)
}

/// Evaluate a report against each template independently, in input order.
pub fn assess_with_templates(
    report: &AssessmentReport,
    templates: &[Template],
) -> Vec<TemplateEvaluation> {
    templates
        .iter()
        .map(|template| evaluate_template(report, template))
        .collect()
}

/// Names custom-rule expressions may reference.
pub(crate) fn is_report_identifier(name: &str) -> bool {
    let name = name.to_lowercase();
    matches!(
        name.as_str(),
        "overall" | "overall_score" | "record_count" | "column_count"
    ) || name
        .strip_suffix(".score")
        .unwrap_or(&name)
        .parse::<Dimension>()
        .is_ok()
}

struct ReportScope<'a> {
    report: &'a AssessmentReport,
}

impl Scope for ReportScope<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        let name = name.to_lowercase();
        match name.as_str() {
            "overall" | "overall_score" => Some(Value::Float(self.report.overall_score())),
            "record_count" => Some(Value::Int(self.report.source().record_count as i64)),
            "column_count" => Some(Value::Int(self.report.source().column_count as i64)),
            other => other
                .strip_suffix(".score")
                .unwrap_or(other)
                .parse::<Dimension>()
                .ok()
                .map(|dimension| Value::Float(self.report.dimension_score(dimension))),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::dimension::DimensionResult;
    use crate::report::SourceInfo;
    use crate::template::loader::{TemplateFormat, load_template_str};

    fn report(scores: [f64; 5], columns: &[&str]) -> AssessmentReport {
        let results = Dimension::ALL
            .iter()
            .zip(scores)
            .map(|(dimension, score)| DimensionResult::with_score(*dimension, score))
            .collect();
        AssessmentReport::new(
            SourceInfo {
                name: "customers".to_string(),
                source_type: "csv".to_string(),
                record_count: 100,
                column_count: columns.len(),
                columns: columns.iter().map(|column| column.to_string()).collect(),
            },
            Utc::now(),
            Utc::now().naive_utc(),
            results,
            BTreeMap::new(),
        )
    }

    fn template(source: &str) -> Template {
        load_template_str(source, TemplateFormat::Yaml)
            .expect("template")
            .template
    }

    const HEADER: &str = "template:\n  id: t\n  version: \"1\"\n  name: T\n";
    /// Minimums block every report meets.
    const FLOOR: &str = "  dimension_minimums:\n    consistency: 0\n";

    #[test]
    fn overall_shortfall_is_a_blocking_gap() {
        let template = template(&format!("{HEADER}requirements:\n  overall_minimum: 80\n{FLOOR}"));
        let report = report([13.08; 5], &["id"]);
        assert_eq!(report.overall_score(), 65.4);

        let evaluation = evaluate_template(&report, &template);
        assert!(!evaluation.compliant);
        assert!(!evaluation.certification_eligible);
        assert_eq!(evaluation.gaps.len(), 1);
        let gap = &evaluation.gaps[0];
        assert_eq!(gap.requirement_description, "Overall score must be at least 80");
        assert_eq!(gap.expected_value, json!(80.0));
        assert_eq!(gap.actual_value, json!(65.4));
        assert_eq!(gap.severity, GapSeverity::Blocking);
        assert_eq!(evaluation.remediation_effort, RemediationEffort::Moderate);
        assert_eq!(evaluation.requirements_total, 2);
        assert_eq!(evaluation.compliance_score, 50.0);
    }

    #[test]
    fn dimension_gap_severity_depends_on_shortfall() {
        let template = template(&format!(
            "{HEADER}requirements:\n  overall_minimum: 0\n  dimension_minimums:\n    freshness: 12\n    validity: 16\n"
        ));
        let report = report([12.0, 20.0, 3.0, 20.0, 20.0], &["id"]);
        let evaluation = evaluate_template(&report, &template);

        let severities: Vec<(Option<Dimension>, GapSeverity)> = evaluation
            .gaps
            .iter()
            .map(|gap| (gap.dimension, gap.severity))
            .collect();
        assert_eq!(
            severities,
            vec![
                (Some(Dimension::Freshness), GapSeverity::High),
                (Some(Dimension::Validity), GapSeverity::Medium),
            ]
        );
        assert_eq!(
            evaluation.gaps[0].requirement_description,
            "Freshness score must be at least 12"
        );
        assert_eq!(evaluation.requirements_total, 3);
        assert_eq!(evaluation.requirements_met, 1);
        assert_eq!(evaluation.compliance_score, 33.33);
        assert_eq!(evaluation.remediation_points, 8);
    }

    #[test]
    fn exact_minimums_are_compliant_and_certified() {
        let template = template(&format!(
            "{HEADER}requirements:\n  overall_minimum: 60\n  dimension_minimums:\n    validity: 12\ncertification:\n  level: Silver\n  validity_period_days: 30\n  standards: [dq-1]\n  minimum_score: 60\n  dimension_floor: 12\n"
        ));
        let report = report([12.0; 5], &["id"]);
        let evaluation = evaluate_template(&report, &template);

        assert!(evaluation.compliant);
        assert!(evaluation.gaps.is_empty());
        assert_eq!(evaluation.compliance_score, 100.0);
        assert_eq!(evaluation.remediation_effort, RemediationEffort::None);
        assert!(evaluation.certification_eligible);
        let badge = evaluation.certification.expect("badge");
        assert_eq!(badge.level, "Silver");
        assert_eq!(badge.standards, vec!["dq-1".to_string()]);
        assert_eq!(badge.issued_at, report.assessment_time());
        assert_eq!(
            badge.valid_until,
            Some(report.assessment_time() + Duration::days(30))
        );
    }

    #[test]
    fn certification_floor_blocks_badge_without_gaps() {
        let template = template(&format!(
            "{HEADER}requirements:\n  overall_minimum: 50\n{FLOOR}certification:\n  level: Gold\n  dimension_floor: 15\n"
        ));
        let report = report([20.0, 20.0, 10.0, 20.0, 20.0], &["id"]);
        let evaluation = evaluate_template(&report, &template);
        assert!(evaluation.compliant);
        assert!(!evaluation.certification_eligible);
        assert!(evaluation.certification.is_none());
    }

    #[test]
    fn mandatory_fields_use_column_matching() {
        let template = template(&format!(
            "{HEADER}requirements:\n  overall_minimum: 0\n{FLOOR}  mandatory_fields: [customer_id, email, phone]\n"
        ));
        let report = report([20.0; 5], &["Customer-ID", "email", "country"]);
        let evaluation = evaluate_template(&report, &template);

        let matched: Vec<&str> = evaluation
            .field_matches
            .iter()
            .map(|found| found.column.as_str())
            .collect();
        assert_eq!(matched, vec!["Customer-ID", "email"]);
        assert_eq!(evaluation.gaps.len(), 1);
        assert_eq!(evaluation.gaps[0].requirement, RequirementKind::MandatoryField);
        assert_eq!(evaluation.gaps[0].severity, GapSeverity::High);
    }

    #[test]
    fn custom_rules_see_report_values() {
        let template = template(&format!(
            "{HEADER}requirements:\n  overall_minimum: 0\n{FLOOR}  custom_rules:\n    - name: enough_rows\n      expression: record_count >= 50 and validity.score > 10\n    - name: fresh\n      expression: freshness >= 15\n      severity: low\n      remediation: Refresh the extract\n    - name: typo\n      expression: accuracy > 1\n"
        ));
        let report = report([12.0, 20.0, 3.0, 20.0, 20.0], &["id"]);
        let evaluation = evaluate_template(&report, &template);

        assert_eq!(evaluation.requirements_total, 5);
        assert_eq!(evaluation.requirements_met, 3);
        assert_eq!(evaluation.gaps[0].severity, GapSeverity::Medium);
        assert_eq!(
            evaluation.gaps[0].actual_value,
            json!({"error": "unknown identifier 'accuracy'"})
        );
        assert_eq!(evaluation.gaps[1].severity, GapSeverity::Low);
        assert!(!evaluation.compliant);
        assert_eq!(
            evaluation.recommendations,
            vec![
                "Satisfy custom rule 'typo'".to_string(),
                "Refresh the extract".to_string()
            ]
        );
    }

    #[test]
    fn required_rules_must_have_run() {
        let template = template(&format!(
            "{HEADER}requirements:\n  overall_minimum: 0\n{FLOOR}  required_rules: [validity.type_consistency]\n"
        ));
        let report = report([20.0; 5], &["id"]);
        let evaluation = evaluate_template(&report, &template);
        assert_eq!(evaluation.gaps.len(), 1);
        assert_eq!(evaluation.gaps[0].actual_value, json!("not configured"));
        assert!(evaluation.has_blocking_gaps());
    }

    #[test]
    fn templates_are_evaluated_independently() {
        let strict = template(&format!("{HEADER}requirements:\n  overall_minimum: 90\n{FLOOR}"));
        let lenient = template(&format!("{HEADER}requirements:\n  overall_minimum: 50\n{FLOOR}"));
        let report = report([14.0; 5], &["id"]);

        let both = assess_with_templates(&report, &[strict.clone(), lenient.clone()]);
        assert!(!both[0].compliant);
        assert!(both[1].compliant);
        assert_eq!(both[1], evaluate_template(&report, &lenient));
        assert_eq!(both[0], evaluate_template(&report, &strict));
    }

    #[test]
    fn effort_buckets() {
        assert_eq!(RemediationEffort::from_points(0), RemediationEffort::None);
        assert_eq!(RemediationEffort::from_points(3), RemediationEffort::Minimal);
        assert_eq!(RemediationEffort::from_points(10), RemediationEffort::Moderate);
        assert_eq!(RemediationEffort::from_points(20), RemediationEffort::Significant);
        assert_eq!(RemediationEffort::from_points(21), RemediationEffort::Extensive);
    }
}
