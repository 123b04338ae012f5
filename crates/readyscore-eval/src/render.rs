use crate::dimension::RuleStatus;
use crate::report::AssessmentReport;
use crate::template::TemplateEvaluation;

/// Findings listed per dimension before the rest are summarized.
pub const DEFAULT_MAX_FINDINGS: usize = 10;

/// Render a human-readable Markdown summary of a report.
pub fn render_markdown(report: &AssessmentReport, max_findings: usize) -> String {
    let mut lines = Vec::new();
    let source = report.source();

    lines.push("# Data Readiness Report".to_string());
    lines.push(String::new());
    lines.push("## Assessment summary".to_string());
    lines.push(format!("- assessment_id: {}", report.assessment_id()));
    lines.push(format!("- source: {} ({})", source.name, source.source_type));
    lines.push(format!("- records: {}", source.record_count));
    lines.push(format!("- columns: {}", source.column_count));
    lines.push(format!(
        "- assessed_at: {}",
        report.assessment_time().to_rfc3339()
    ));
    lines.push(format!("- as_of: {}", report.as_of()));
    lines.push(format!("- overall_score: {:.2} / 100", report.overall_score()));
    lines.push(format!("- readiness_level: {}", report.readiness_level()));
    lines.push(String::new());

    lines.push("## Dimension scores".to_string());
    lines.push("| dimension | score | weight | rules run | rules failed | findings |".to_string());
    lines.push("| --- | --- | --- | --- | --- | --- |".to_string());
    for (dimension, result) in report.dimension_results() {
        let weight = report
            .dimension_weights()
            .get(dimension)
            .copied()
            .unwrap_or(1.0);
        let ran = count_status(result.rule_outcomes.iter().map(|o| o.status), RuleStatus::Evaluated);
        let failed = count_status(result.rule_outcomes.iter().map(|o| o.status), RuleStatus::Failed);
        lines.push(format!(
            "| {} | {:.2} / {} | {} | {} | {} | {} |",
            dimension,
            result.score,
            result.max_score,
            weight,
            ran,
            failed,
            result.findings.len()
        ));
    }
    lines.push(String::new());

    let with_findings: Vec<_> = report
        .dimension_results()
        .values()
        .filter(|result| !result.findings.is_empty())
        .collect();
    if !with_findings.is_empty() {
        lines.push("## Findings".to_string());
        for result in with_findings {
            lines.push(format!("### {}", result.dimension));
            for finding in result.findings.iter().take(max_findings) {
                lines.push(format!("- {finding}"));
            }
            if result.findings.len() > max_findings {
                lines.push(format!(
                    "- ... {} more",
                    result.findings.len() - max_findings
                ));
            }
        }
        lines.push(String::new());
    }

    if !report.template_evaluations().is_empty() {
        lines.push("## Template evaluations".to_string());
        for evaluation in report.template_evaluations() {
            push_template(&mut lines, evaluation);
        }
    }

    let mut recommendations: Vec<&str> = Vec::new();
    let dimension_recs = report
        .dimension_results()
        .values()
        .flat_map(|result| result.recommendations.iter());
    let template_recs = report
        .template_evaluations()
        .iter()
        .flat_map(|evaluation| evaluation.recommendations.iter());
    for recommendation in dimension_recs.chain(template_recs) {
        if !recommendations.contains(&recommendation.as_str()) {
            recommendations.push(recommendation);
        }
    }
    lines.push("## Recommendations".to_string());
    if recommendations.is_empty() {
        lines.push("- No recommendations.".to_string());
    } else {
        for recommendation in recommendations {
            lines.push(format!("- {recommendation}"));
        }
    }

    lines.join("\n")
}

fn push_template(lines: &mut Vec<String>, evaluation: &TemplateEvaluation) {
    lines.push(format!(
        "### {} ({} v{})",
        evaluation.template_name, evaluation.template_id, evaluation.template_version
    ));
    lines.push(format!("- compliant: {}", evaluation.compliant));
    lines.push(format!(
        "- compliance_score: {:.2}% ({} of {} requirements met)",
        evaluation.compliance_score, evaluation.requirements_met, evaluation.requirements_total
    ));
    lines.push(format!(
        "- remediation_effort: {}",
        evaluation.remediation_effort.as_str()
    ));
    match &evaluation.certification {
        Some(badge) => {
            let until = badge
                .valid_until
                .map(|until| format!(" until {}", until.date_naive()))
                .unwrap_or_default();
            lines.push(format!("- certification: {}{}", badge.level, until));
        }
        None => lines.push(format!(
            "- certification_eligible: {}",
            evaluation.certification_eligible
        )),
    }
    if !evaluation.gaps.is_empty() {
        lines.push(String::new());
        lines.push("| severity | requirement | expected | actual |".to_string());
        lines.push("| --- | --- | --- | --- |".to_string());
        for gap in &evaluation.gaps {
            lines.push(format!(
                "| {} | {} | {} | {} |",
                gap.severity, gap.requirement_description, gap.expected_value, gap.actual_value
            ));
        }
    }
    lines.push(String::new());
}

fn count_status(statuses: impl Iterator<Item = RuleStatus>, wanted: RuleStatus) -> usize {
    statuses.filter(|status| *status == wanted).count()
}
