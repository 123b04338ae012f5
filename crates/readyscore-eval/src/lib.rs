//! Assessment engine: runs the dimension rules over a dataset, aggregates
//! scores into a report, and checks reports against compliance templates.

pub mod config;
pub mod dimension;
pub mod engine;
pub mod errors;
pub mod gate;
pub mod readiness;
pub mod render;
pub mod report;
pub mod template;

pub use config::{AssessmentConfig, DimensionConfig, PreparedConfig, RuleConfig};
pub use dimension::{DimensionEvaluator, DimensionResult, RuleOutcome, RuleStatus};
pub use engine::AssessmentEngine;
pub use errors::{EvalError, IssueSeverity, TemplateError, ValidationIssue, ValidationReport};
pub use gate::{GateFailure, GateOutcome, ScoreGate};
pub use readiness::ReadinessLevel;
pub use render::{DEFAULT_MAX_FINDINGS, render_markdown};
pub use report::{AssessmentReport, SourceInfo};
pub use template::{
    GapSeverity, Template, TemplateCatalog, TemplateEvaluation, assess_with_templates,
    evaluate_template,
};
