use std::collections::HashSet;
use std::path::Path;

use jsonschema::JSONSchema;
use regex::Regex;
use schemars::schema::RootSchema;
use schemars::schema_for;
use serde_json::Value;
use tracing::{debug, warn};

use readyscore_core::{Dimension, MAX_DIMENSION_SCORE, MAX_OVERALL_SCORE, parse_expression};

use crate::errors::{TemplateError, ValidationIssue, ValidationReport};
use crate::template::evaluator::is_report_identifier;
use crate::template::model::{DimensionRequirement, Template};

/// Template accepted by validation, with any warnings raised on the way.
#[derive(Debug, Clone)]
pub struct ValidatedTemplate {
    pub template: Template,
    pub warnings: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    Yaml,
    Json,
}

impl TemplateFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Some(TemplateFormat::Yaml),
            Some("json") => Some(TemplateFormat::Json),
            _ => None,
        }
    }
}

/// Emit the JSON Schema for template documents.
pub fn template_json_schema() -> RootSchema {
    schema_for!(Template)
}

/// Validate a template document against the template JSON Schema.
pub fn validate_template_json(template_json: &Value) -> Result<ValidationReport, TemplateError> {
    let schema = serde_json::to_value(template_json_schema())?;
    let compiled =
        JSONSchema::compile(&schema).map_err(|err| TemplateError::Schema(err.to_string()))?;

    let mut report = ValidationReport::default();
    if let Err(errors) = compiled.validate(template_json) {
        for error in errors {
            let path = normalized_json_pointer(&error.instance_path.to_string());
            report.push_error(ValidationIssue::error(
                "schema_violation",
                path,
                error.to_string(),
                None,
            ));
        }
    }
    Ok(report)
}

/// Semantic checks the schema cannot express: ranges, expressions and patterns.
pub fn validate_template(template: &Template) -> ValidationReport {
    let mut report = ValidationReport::default();

    if template.template.id.trim().is_empty() {
        report.push_error(ValidationIssue::error(
            "empty_template_id",
            "/template/id",
            "template id must not be empty",
            None,
        ));
    }

    check_range(
        &mut report,
        "/requirements/overall_minimum",
        template.requirements.overall_minimum,
        MAX_OVERALL_SCORE,
    );
    if template.requirements.dimension_minimums.is_empty()
        && template.requirements.dimension_requirements.is_empty()
    {
        report.push_error(ValidationIssue::error(
            "missing_dimension_minimums",
            "/requirements",
            "requirements must declare dimension_minimums or dimension_requirements",
            Some("add at least one per-dimension minimum score".to_string()),
        ));
    }
    validate_dimension_minimums(template, &mut report);
    validate_required_rules(template, &mut report);
    validate_custom_rules(template, &mut report);
    validate_pattern_matching(template, &mut report);

    if let Some(certification) = &template.certification {
        if let Some(minimum) = certification.minimum_score {
            check_range(
                &mut report,
                "/certification/minimum_score",
                minimum,
                MAX_OVERALL_SCORE,
            );
        }
        if let Some(floor) = certification.dimension_floor {
            check_range(
                &mut report,
                "/certification/dimension_floor",
                floor,
                MAX_DIMENSION_SCORE,
            );
        }
    }

    report
}

/// Validate the template end-to-end, returning structured issues on failure.
pub fn validate_template_value(template_json: &Value) -> Result<ValidatedTemplate, ValidationReport> {
    let structural = match validate_template_json(template_json) {
        Ok(report) => report,
        Err(err) => {
            let mut report = ValidationReport::default();
            report.push_error(ValidationIssue::error(
                "schema_validation_error",
                "/",
                err.to_string(),
                None,
            ));
            return Err(report);
        }
    };
    if !structural.is_ok() {
        return Err(structural);
    }

    let template: Template = match serde_json::from_value(template_json.clone()) {
        Ok(template) => template,
        Err(err) => {
            let mut report = ValidationReport::default();
            report.push_error(ValidationIssue::error(
                "invalid_template",
                "/",
                err.to_string(),
                None,
            ));
            return Err(report);
        }
    };

    let semantic = validate_template(&template);
    if !semantic.is_ok() {
        return Err(semantic);
    }
    Ok(ValidatedTemplate {
        template,
        warnings: semantic.warnings,
    })
}

/// Parse and validate a template document held in memory.
pub fn load_template_str(
    source: &str,
    format: TemplateFormat,
) -> Result<ValidatedTemplate, TemplateError> {
    let value: Value = match format {
        TemplateFormat::Yaml => serde_yaml::from_str(source)?,
        TemplateFormat::Json => serde_json::from_str(source)?,
    };
    let validated = validate_template_value(&value).map_err(TemplateError::Validation)?;
    for warning in &validated.warnings {
        warn!(
            event = "template_warning",
            template = %validated.template.template.id,
            code = %warning.code,
            path = %warning.path,
            message = %warning.message
        );
    }
    debug!(
        event = "template_loaded",
        template = %validated.template.template.id,
        version = %validated.template.template.version
    );
    Ok(validated)
}

/// Load a template file; the format follows the extension.
pub fn load_template_path(path: &Path) -> Result<ValidatedTemplate, TemplateError> {
    let format = TemplateFormat::from_path(path)
        .ok_or_else(|| TemplateError::UnsupportedFormat(path.to_path_buf()))?;
    let source = std::fs::read_to_string(path)?;
    load_template_str(&source, format)
}

fn validate_dimension_minimums(template: &Template, report: &mut ValidationReport) {
    let requirements = &template.requirements;
    for (dimension, minimum) in &requirements.dimension_minimums {
        check_range(
            report,
            &format!("/requirements/dimension_minimums/{dimension}"),
            *minimum,
            MAX_DIMENSION_SCORE,
        );
    }
    for (dimension, requirement) in &requirements.dimension_requirements {
        let Some(minimum) = requirement.minimum_score() else {
            continue;
        };
        let path = match requirement {
            DimensionRequirement::Minimum(_) => {
                format!("/requirements/dimension_requirements/{dimension}")
            }
            DimensionRequirement::Detailed(_) => {
                format!("/requirements/dimension_requirements/{dimension}/minimum_score")
            }
        };
        check_range(report, &path, minimum, MAX_DIMENSION_SCORE);
        if let Some(flat) = requirements.dimension_minimums.get(dimension)
            && *flat != minimum
        {
            report.push_warning(ValidationIssue::warning(
                "conflicting_dimension_minimum",
                path,
                format!(
                    "{dimension} minimum is {minimum} here but {flat} in dimension_minimums; using {minimum}"
                ),
                None,
            ));
        }
    }
}

fn validate_required_rules(template: &Template, report: &mut ValidationReport) {
    let requirements = &template.requirements;
    for (index, rule) in requirements.required_rules.iter().enumerate() {
        let path = format!("/requirements/required_rules/{index}");
        let Some((prefix, name)) = rule.split_once('.') else {
            report.push_error(ValidationIssue::error(
                "invalid_rule_id",
                path,
                format!("required rule '{rule}' must be qualified as dimension.rule"),
                Some("list short rule names under dimension_requirements instead".to_string()),
            ));
            continue;
        };
        if prefix.parse::<Dimension>().is_err() || name.is_empty() {
            report.push_error(ValidationIssue::error(
                "invalid_rule_id",
                path,
                format!("required rule '{rule}' does not name a known dimension"),
                None,
            ));
        }
    }
    for (dimension, requirement) in &requirements.dimension_requirements {
        for (index, rule) in requirement.required_rules().iter().enumerate() {
            if let Some((prefix, _)) = rule.split_once('.')
                && prefix != dimension.as_str()
            {
                report.push_error(ValidationIssue::error(
                    "invalid_rule_id",
                    format!(
                        "/requirements/dimension_requirements/{dimension}/required_rules/{index}"
                    ),
                    format!("rule '{rule}' does not belong to dimension {dimension}"),
                    None,
                ));
            }
        }
    }
}

fn validate_custom_rules(template: &Template, report: &mut ValidationReport) {
    let mut seen = HashSet::new();
    for (index, rule) in template.requirements.custom_rules.iter().enumerate() {
        let path = format!("/requirements/custom_rules/{index}");
        if !seen.insert(rule.name.as_str()) {
            report.push_warning(ValidationIssue::warning(
                "duplicate_custom_rule",
                format!("{path}/name"),
                format!("custom rule '{}' is declared more than once", rule.name),
                None,
            ));
        }
        match parse_expression(&rule.expression) {
            Ok(expr) => {
                for identifier in expr.identifiers() {
                    if !is_report_identifier(identifier) {
                        report.push_warning(ValidationIssue::warning(
                            "unknown_identifier",
                            format!("{path}/expression"),
                            format!(
                                "'{identifier}' is not a report value; the rule will be reported unmet"
                            ),
                            Some(
                                "use overall_score, record_count, column_count or a dimension name"
                                    .to_string(),
                            ),
                        ));
                    }
                }
            }
            Err(err) => report.push_error(ValidationIssue::error(
                "invalid_expression",
                format!("{path}/expression"),
                err.to_string(),
                None,
            )),
        }
    }
}

fn validate_pattern_matching(template: &Template, report: &mut ValidationReport) {
    let Some(matching) = &template.pattern_matching else {
        return;
    };
    if !(0.0..=1.0).contains(&matching.min_confidence) {
        report.push_error(ValidationIssue::error(
            "out_of_range",
            "/pattern_matching/min_confidence",
            format!(
                "min_confidence {} must be between 0 and 1",
                matching.min_confidence
            ),
            None,
        ));
    }
    for (field, pattern) in &matching.fields {
        for (index, source) in pattern.patterns.iter().enumerate() {
            if let Err(err) = Regex::new(source) {
                report.push_error(ValidationIssue::error(
                    "invalid_pattern",
                    format!("/pattern_matching/fields/{field}/patterns/{index}"),
                    err.to_string(),
                    None,
                ));
            }
        }
    }
}

fn check_range(report: &mut ValidationReport, path: &str, value: f64, max: f64) {
    if !value.is_finite() || !(0.0..=max).contains(&value) {
        report.push_error(ValidationIssue::error(
            "out_of_range",
            path,
            format!("{value} must be between 0 and {max}"),
            None,
        ));
    }
}

fn normalized_json_pointer(pointer: &str) -> String {
    if pointer.is_empty() {
        "/".to_string()
    } else {
        pointer.to_string()
    }
}
